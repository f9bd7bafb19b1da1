use super::buckets::{day_bucket, hour_bucket};
use super::types::{DailyStats, Event, HourlyStats, Severity};
use super::{FEATURE_BATTERY_LEVEL, FEATURE_ENERGY_KWH, FEATURE_TEMPERATURE, SECONDS_PER_HOUR};
use std::collections::HashMap;

/// Rolls device events into hourly and daily summaries.
///
/// Every operation is total: degenerate input yields an empty or zeroed
/// result instead of an error.
#[derive(Clone, Copy, Debug, Default)]
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    /// Keeps the finite numeric metadata entries of `event`, widened to `f64`.
    pub fn extract_features(&self, event: &Event) -> HashMap<String, f64> {
        event
            .metadata
            .iter()
            .filter_map(|(key, value)| value.as_finite_f64().map(|v| (key.clone(), v)))
            .collect()
    }

    pub fn compute_hourly_stats(&self, event: &Event, features: &HashMap<String, f64>) -> HourlyStats {
        let mut stats = HourlyStats {
            device_id: event.device_id.clone(),
            hour_bucket: hour_bucket(event.timestamp),
            event_count: 1,
            ..HourlyStats::default()
        };

        match event.severity {
            Severity::Critical => stats.critical_count = 1,
            Severity::High => stats.high_count = 1,
            Severity::Medium => stats.medium_count = 1,
            Severity::Low => stats.low_count = 1,
            Severity::Other(_) => {}
        }

        if let Some(&temp) = features.get(FEATURE_TEMPERATURE) {
            stats.temp_sum = temp;
            stats.temp_count = 1;
            stats.temp_min = temp;
            stats.temp_max = temp;
        }
        if let Some(&battery) = features.get(FEATURE_BATTERY_LEVEL) {
            stats.battery_sum = battery;
            stats.battery_count = 1;
            stats.battery_min = battery;
            stats.battery_max = battery;
        }
        if let Some(&energy) = features.get(FEATURE_ENERGY_KWH) {
            stats.energy_sum = energy;
            stats.energy_count = 1;
        }

        tracing::debug!(
            component = "aggregator",
            device_id = %stats.device_id,
            hour_bucket = %stats.hour_bucket,
            event_count = stats.event_count,
            "computed hourly stats"
        );

        stats
    }

    /// Folds partial aggregates of one device/hour into a single value.
    ///
    /// Identity and seeds come from the first element. A running minimum of
    /// exactly `0.0` counts as unset and is replaced by the next candidate,
    /// so a genuine zero reading does not survive a merge with later partials.
    pub fn merge_hourly_stats(&self, stats: &[HourlyStats]) -> Option<HourlyStats> {
        let first = stats.first()?;
        let mut merged = HourlyStats {
            device_id: first.device_id.clone(),
            hour_bucket: first.hour_bucket,
            temp_min: first.temp_min,
            temp_max: first.temp_max,
            battery_min: first.battery_min,
            battery_max: first.battery_max,
            ..HourlyStats::default()
        };

        for partial in stats {
            merged.event_count += partial.event_count;
            merged.critical_count += partial.critical_count;
            merged.high_count += partial.high_count;
            merged.medium_count += partial.medium_count;
            merged.low_count += partial.low_count;

            merged.temp_sum += partial.temp_sum;
            merged.temp_count += partial.temp_count;
            merged.temp_min = fold_min(merged.temp_min, partial.temp_min);
            merged.temp_max = fold_max(merged.temp_max, partial.temp_max);

            merged.battery_sum += partial.battery_sum;
            merged.battery_count += partial.battery_count;
            merged.battery_min = fold_min(merged.battery_min, partial.battery_min);
            merged.battery_max = fold_max(merged.battery_max, partial.battery_max);

            merged.energy_sum += partial.energy_sum;
            merged.energy_count += partial.energy_count;
        }

        tracing::debug!(
            component = "aggregator",
            device_id = %merged.device_id,
            hour_bucket = %merged.hour_bucket,
            stats_count = stats.len(),
            total_events = merged.event_count,
            "merged hourly stats"
        );

        Some(merged)
    }

    /// Rolls a device's hourly buckets for one day into a daily summary.
    ///
    /// Only the supplied hours count: the hourly average divides by the
    /// number of buckets and every bucket contributes a full hour of uptime.
    pub fn compute_daily_stats(&self, hourly_stats: &[HourlyStats]) -> Option<DailyStats> {
        let first = hourly_stats.first()?;
        let mut daily = DailyStats {
            device_id: first.device_id.clone(),
            day_bucket: day_bucket(first.hour_bucket),
            temp_min: first.temp_min,
            temp_max: first.temp_max,
            battery_min: first.battery_min,
            ..DailyStats::default()
        };

        let mut total_events = 0i64;
        let mut max_hourly = 0i64;
        let mut temp_sum = 0.0;
        let mut temp_count = 0i64;
        let mut battery_sum = 0.0;
        let mut battery_count = 0i64;

        for hourly in hourly_stats {
            total_events += hourly.event_count;
            daily.alert_count += hourly.alert_count();
            max_hourly = max_hourly.max(hourly.event_count);

            temp_sum += hourly.temp_sum;
            temp_count += hourly.temp_count;
            daily.temp_min = fold_min(daily.temp_min, hourly.temp_min);
            daily.temp_max = fold_max(daily.temp_max, hourly.temp_max);

            battery_sum += hourly.battery_sum;
            battery_count += hourly.battery_count;
            daily.battery_min = fold_min(daily.battery_min, hourly.battery_min);

            daily.energy_total += hourly.energy_sum;
        }

        let buckets = hourly_stats.len() as i64;
        daily.event_count = total_events;
        daily.max_hourly_count = max_hourly;
        daily.hourly_avg_count = total_events as f64 / buckets as f64;
        if temp_count > 0 {
            daily.temp_avg = temp_sum / temp_count as f64;
        }
        if battery_count > 0 {
            daily.battery_avg = battery_sum / battery_count as f64;
        }
        daily.uptime_seconds = buckets * SECONDS_PER_HOUR;

        tracing::debug!(
            component = "aggregator",
            device_id = %daily.device_id,
            day_bucket = %daily.day_bucket,
            event_count = daily.event_count,
            temp_avg = daily.temp_avg,
            "computed daily stats"
        );

        Some(daily)
    }
}

fn fold_min(running: f64, candidate: f64) -> f64 {
    if candidate < running || running == 0.0 {
        candidate
    } else {
        running
    }
}

fn fold_max(running: f64, candidate: f64) -> f64 {
    if candidate > running {
        candidate
    } else {
        running
    }
}
