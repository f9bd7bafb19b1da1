use super::buckets::seconds_between;
use super::types::{DataPoint, Percentiles, RollingStats, TimeFeatures};
use chrono::{DateTime, Datelike, Timelike, Utc};

pub const DEFAULT_EMA_ALPHA: f64 = 0.3;
const MIN_OUTLIER_POINTS: usize = 4;

/// Feature calculations over ascending `DataPoint` series.
///
/// Callers own ordering; nothing here sorts the input in place. Invalid
/// parameters degrade to empty or default results.
#[derive(Clone, Copy, Debug, Default)]
pub struct Calculator;

impl Calculator {
    pub fn new() -> Self {
        Self
    }

    /// Trailing mean of `window_size` values, stamped at the window's last point.
    pub fn compute_rolling_average(&self, points: &[DataPoint], window_size: usize) -> Vec<DataPoint> {
        if window_size == 0 || points.len() < window_size {
            tracing::debug!(
                component = "calculator",
                points = points.len(),
                window_size,
                "insufficient data for rolling average"
            );
            return Vec::new();
        }

        let result: Vec<DataPoint> = points
            .windows(window_size)
            .map(|window| {
                let sum: f64 = window.iter().map(|p| p.value).sum();
                DataPoint::new(window[window_size - 1].timestamp, sum / window_size as f64)
            })
            .collect();

        tracing::debug!(
            component = "calculator",
            input_points = points.len(),
            output_points = result.len(),
            window_size,
            "computed rolling average"
        );

        result
    }

    /// Statistics over the last `window_size` points only.
    pub fn compute_rolling_stats(&self, points: &[DataPoint], window_size: usize) -> RollingStats {
        if window_size == 0 || points.len() < window_size {
            return RollingStats::default();
        }

        let window = &points[points.len() - window_size..];
        let mut stats = RollingStats {
            count: window_size as i64,
            min: window[0].value,
            max: window[0].value,
            ..RollingStats::default()
        };

        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for point in window {
            let v = point.value;
            sum += v;
            sum_sq += v * v;
            stats.min = stats.min.min(v);
            stats.max = stats.max.max(v);
        }

        let n = window_size as f64;
        stats.sum = sum;
        stats.mean = sum / n;
        // Population variance; cancellation can push it slightly negative.
        let variance = sum_sq / n - stats.mean * stats.mean;
        if variance > 0.0 {
            stats.std_dev = variance.sqrt();
        }

        tracing::debug!(
            component = "calculator",
            window_size,
            mean = stats.mean,
            std_dev = stats.std_dev,
            "computed rolling stats"
        );

        stats
    }

    /// Percentile `p` in `[0, 100]` with linear interpolation between the
    /// closest ranks. Empty input or an out-of-range `p` yields `0.0`.
    pub fn compute_percentile(&self, points: &[DataPoint], p: f64) -> f64 {
        if points.is_empty() {
            tracing::warn!(component = "calculator", "no data points for percentile calculation");
            return 0.0;
        }
        if !(0.0..=100.0).contains(&p) {
            tracing::warn!(component = "calculator", percentile = p, "invalid percentile value");
            return 0.0;
        }

        let sorted = sorted_values(points);
        let result = percentile_from_sorted(&sorted, p);

        tracing::debug!(
            component = "calculator",
            percentile = p,
            result,
            data_points = points.len(),
            "computed percentile"
        );

        result
    }

    pub fn compute_percentiles(&self, points: &[DataPoint]) -> Percentiles {
        if points.is_empty() {
            return Percentiles::default();
        }

        let sorted = sorted_values(points);
        let percentiles = Percentiles {
            p50: percentile_from_sorted(&sorted, 50.0),
            p95: percentile_from_sorted(&sorted, 95.0),
            p99: percentile_from_sorted(&sorted, 99.0),
        };

        tracing::debug!(
            component = "calculator",
            p50 = percentiles.p50,
            p95 = percentiles.p95,
            p99 = percentiles.p99,
            "computed percentiles"
        );

        percentiles
    }

    /// Value change per second between consecutive points. Pairs sharing a
    /// timestamp are skipped.
    pub fn compute_rate_of_change(&self, points: &[DataPoint]) -> Vec<DataPoint> {
        let result: Vec<DataPoint> = points
            .windows(2)
            .filter_map(|pair| {
                let elapsed = seconds_between(pair[0].timestamp, pair[1].timestamp);
                if elapsed == 0.0 {
                    return None;
                }
                let rate = (pair[1].value - pair[0].value) / elapsed;
                Some(DataPoint::new(pair[1].timestamp, rate))
            })
            .collect();

        tracing::debug!(
            component = "calculator",
            input_points = points.len(),
            output_points = result.len(),
            "computed rate of change"
        );

        result
    }

    pub fn compute_delta(&self, points: &[DataPoint]) -> Vec<DataPoint> {
        let result: Vec<DataPoint> = points
            .windows(2)
            .map(|pair| DataPoint::new(pair[1].timestamp, pair[1].value - pair[0].value))
            .collect();

        tracing::debug!(
            component = "calculator",
            input_points = points.len(),
            output_points = result.len(),
            "computed delta"
        );

        result
    }

    pub fn extract_time_features(&self, ts: DateTime<Utc>) -> TimeFeatures {
        let day_of_week = ts.weekday().num_days_from_sunday();
        let features = TimeFeatures {
            hour_of_day: ts.hour(),
            day_of_week,
            day_of_month: ts.day(),
            month: ts.month(),
            is_weekend: day_of_week == 0 || day_of_week == 6,
            is_business_day: (1..=5).contains(&day_of_week),
        };

        tracing::debug!(
            component = "calculator",
            hour = features.hour_of_day,
            day_of_week = features.day_of_week,
            is_weekend = features.is_weekend,
            "extracted time features"
        );

        features
    }

    /// EMA seeded with the first point. An `alpha` outside `(0, 1]` is
    /// replaced with [`DEFAULT_EMA_ALPHA`].
    pub fn compute_exponential_moving_average(&self, points: &[DataPoint], alpha: f64) -> Vec<DataPoint> {
        let Some(first) = points.first() else {
            return Vec::new();
        };

        let alpha = if alpha > 0.0 && alpha <= 1.0 {
            alpha
        } else {
            tracing::warn!(
                component = "calculator",
                alpha,
                default = DEFAULT_EMA_ALPHA,
                "invalid alpha value, using default"
            );
            DEFAULT_EMA_ALPHA
        };

        let mut result = Vec::with_capacity(points.len());
        result.push(*first);
        let mut prev = first.value;
        for point in &points[1..] {
            let ema = alpha * point.value + (1.0 - alpha) * prev;
            result.push(DataPoint::new(point.timestamp, ema));
            prev = ema;
        }

        tracing::debug!(
            component = "calculator",
            points = points.len(),
            alpha,
            "computed exponential moving average"
        );

        result
    }

    /// Points outside the Tukey fences `[Q1 - t*IQR, Q3 + t*IQR]`, in input
    /// order. Needs at least four points.
    pub fn detect_outliers(&self, points: &[DataPoint], threshold: f64) -> Vec<DataPoint> {
        if points.len() < MIN_OUTLIER_POINTS {
            return Vec::new();
        }

        let q1 = self.compute_percentile(points, 25.0);
        let q3 = self.compute_percentile(points, 75.0);
        let iqr = q3 - q1;
        let lower_bound = q1 - threshold * iqr;
        let upper_bound = q3 + threshold * iqr;

        let outliers: Vec<DataPoint> = points
            .iter()
            .filter(|p| p.value < lower_bound || p.value > upper_bound)
            .copied()
            .collect();

        tracing::debug!(
            component = "calculator",
            total_points = points.len(),
            outliers = outliers.len(),
            lower_bound,
            upper_bound,
            "detected outliers"
        );

        outliers
    }
}

/// NaN values carry no rank and are left out.
fn sorted_values(points: &[DataPoint]) -> Vec<f64> {
    let mut values: Vec<f64> = points
        .iter()
        .map(|p| p.value)
        .filter(|v| !v.is_nan())
        .collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

fn percentile_from_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0) * (sorted.len() as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = rank - lower as f64;
    sorted[lower] + frac * (sorted[upper] - sorted[lower])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn series(values: &[f64]) -> Vec<DataPoint> {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| DataPoint::new(start + ChronoDuration::minutes(i as i64), *v))
            .collect()
    }

    fn values(points: &[DataPoint]) -> Vec<f64> {
        points.iter().map(|p| p.value).collect()
    }

    #[test]
    fn rolling_average_uses_trailing_windows() {
        let points = series(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let result = Calculator::new().compute_rolling_average(&points, 3);

        assert_eq!(values(&result), vec![2.0, 3.0, 4.0]);
        assert_eq!(result[0].timestamp, points[2].timestamp);
        assert_eq!(result[2].timestamp, points[4].timestamp);
    }

    #[test]
    fn rolling_average_rejects_short_series_and_zero_window() {
        let calc = Calculator::new();
        let points = series(&[1.0, 2.0]);
        assert!(calc.compute_rolling_average(&points, 3).is_empty());
        assert!(calc.compute_rolling_average(&points, 0).is_empty());
        assert!(calc.compute_rolling_average(&[], 1).is_empty());
        assert_eq!(calc.compute_rolling_average(&points, 2).len(), 1);
    }

    #[test]
    fn rolling_stats_cover_last_window_only() {
        let points = series(&[100.0, 2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let stats = Calculator::new().compute_rolling_stats(&points, 8);

        assert_eq!(stats.count, 8);
        assert!((stats.sum - 40.0).abs() < 1e-9);
        assert!((stats.mean - 5.0).abs() < 1e-9);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert!((stats.std_dev - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rolling_stats_of_constant_series_has_zero_deviation() {
        let points = series(&[0.1, 0.1, 0.1, 0.1]);
        let stats = Calculator::new().compute_rolling_stats(&points, 4);
        assert!(stats.std_dev >= 0.0);
        assert!(stats.std_dev < 1e-6);
        assert_eq!(
            Calculator::new().compute_rolling_stats(&points, 5),
            RollingStats::default()
        );
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let calc = Calculator::new();
        assert_eq!(calc.compute_percentile(&series(&[1.0, 2.0, 3.0, 4.0, 5.0]), 50.0), 3.0);
        assert!((calc.compute_percentile(&series(&[1.0, 2.0, 3.0, 4.0]), 50.0) - 2.5).abs() < 1e-12);
        assert_eq!(calc.compute_percentile(&series(&[5.0, 1.0, 3.0]), 0.0), 1.0);
        assert_eq!(calc.compute_percentile(&series(&[5.0, 1.0, 3.0]), 100.0), 5.0);
    }

    #[test]
    fn percentile_out_of_range_or_empty_is_zero() {
        let calc = Calculator::new();
        let points = series(&[1.0, 2.0, 3.0]);
        assert_eq!(calc.compute_percentile(&points, -1.0), 0.0);
        assert_eq!(calc.compute_percentile(&points, 100.5), 0.0);
        assert_eq!(calc.compute_percentile(&points, f64::NAN), 0.0);
        assert_eq!(calc.compute_percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn percentile_does_not_reorder_input() {
        let points = series(&[3.0, 1.0, 2.0]);
        let before = points.clone();
        Calculator::new().compute_percentile(&points, 50.0);
        assert_eq!(points, before);
    }

    #[test]
    fn percentiles_over_one_to_hundred() {
        let raw: Vec<f64> = (1..=100).map(f64::from).collect();
        let p = Calculator::new().compute_percentiles(&series(&raw));
        assert!((p.p50 - 50.5).abs() < 1e-9);
        assert!((p.p95 - 95.05).abs() < 1e-9);
        assert!((p.p99 - 99.01).abs() < 1e-9);
        assert_eq!(Calculator::new().compute_percentiles(&[]), Percentiles::default());
    }

    #[test]
    fn rate_of_change_is_per_second_and_skips_duplicate_timestamps() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let points = vec![
            DataPoint::new(start, 10.0),
            DataPoint::new(start + ChronoDuration::seconds(10), 20.0),
            DataPoint::new(start + ChronoDuration::seconds(10), 25.0),
            DataPoint::new(start + ChronoDuration::seconds(15), 15.0),
        ];
        let result = Calculator::new().compute_rate_of_change(&points);

        assert_eq!(result.len(), 2);
        assert!((result[0].value - 1.0).abs() < 1e-12);
        assert!((result[1].value + 2.0).abs() < 1e-12);
        assert_eq!(result[1].timestamp, points[3].timestamp);
        assert!(Calculator::new().compute_rate_of_change(&points[..1]).is_empty());
    }

    #[test]
    fn delta_between_consecutive_points() {
        let calc = Calculator::new();
        let result = calc.compute_delta(&series(&[10.0, 15.0, 12.0]));
        assert_eq!(values(&result), vec![5.0, -3.0]);
        assert!(calc.compute_delta(&series(&[1.0])).is_empty());
    }

    #[test]
    fn time_features_for_weekday_and_weekend() {
        let calc = Calculator::new();
        // 2024-03-15 is a Friday.
        let friday = calc.extract_time_features(Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap());
        assert_eq!(friday.hour_of_day, 14);
        assert_eq!(friday.day_of_week, 5);
        assert_eq!(friday.day_of_month, 15);
        assert_eq!(friday.month, 3);
        assert!(!friday.is_weekend);
        assert!(friday.is_business_day);

        let sunday = calc.extract_time_features(Utc.with_ymd_and_hms(2024, 3, 17, 0, 0, 0).unwrap());
        assert_eq!(sunday.day_of_week, 0);
        assert!(sunday.is_weekend);
        assert!(!sunday.is_business_day);

        let saturday = calc.extract_time_features(Utc.with_ymd_and_hms(2024, 3, 16, 23, 59, 59).unwrap());
        assert_eq!(saturday.day_of_week, 6);
        assert!(saturday.is_weekend);
    }

    #[test]
    fn ema_recurrence() {
        let points = series(&[10.0, 20.0, 30.0]);
        let result = Calculator::new().compute_exponential_moving_average(&points, 0.5);
        assert_eq!(values(&result), vec![10.0, 15.0, 22.5]);
        assert_eq!(result[2].timestamp, points[2].timestamp);
    }

    #[test]
    fn ema_invalid_alpha_falls_back_to_default() {
        let calc = Calculator::new();
        let points = series(&[10.0, 20.0, 30.0, 5.0]);
        let expected = calc.compute_exponential_moving_average(&points, DEFAULT_EMA_ALPHA);
        for alpha in [1.5, 0.0, -0.2, f64::NAN] {
            assert_eq!(calc.compute_exponential_moving_average(&points, alpha), expected);
        }
        assert_eq!(calc.compute_exponential_moving_average(&points, 1.0), points);
        assert!(calc.compute_exponential_moving_average(&[], 0.5).is_empty());
    }

    #[test]
    fn outliers_outside_tukey_fences() {
        let calc = Calculator::new();
        let points = series(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        let outliers = calc.detect_outliers(&points, 1.5);
        assert_eq!(values(&outliers), vec![100.0]);
        assert_eq!(outliers[0].timestamp, points[4].timestamp);

        let points = series(&[-50.0, 10.0, 11.0, 12.0, 13.0, 90.0]);
        assert_eq!(values(&calc.detect_outliers(&points, 1.5)), vec![-50.0, 90.0]);
    }

    #[test]
    fn nan_values_are_left_out_of_ranks() {
        let calc = Calculator::new();
        let points = series(&[3.0, f64::NAN, 1.0, 2.0]);
        assert_eq!(calc.compute_percentile(&points, 50.0), 2.0);
        assert!((calc.compute_percentiles(&points).p99 - 2.98).abs() < 1e-9);
        assert_eq!(calc.compute_percentile(&series(&[f64::NAN]), 50.0), 0.0);

        let points = series(&[1.0, 2.0, f64::NAN, 3.0, 4.0, 100.0]);
        assert_eq!(values(&calc.detect_outliers(&points, 1.5)), vec![100.0]);
    }

    #[test]
    fn outliers_need_four_points() {
        let points = series(&[1.0, 2.0, 100.0]);
        assert!(Calculator::new().detect_outliers(&points, 1.5).is_empty());
    }
}
