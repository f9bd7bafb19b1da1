use super::{Aggregator, Calculator, DataPoint, Event, HourlyStats, MetadataValue, Severity};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap()
}

fn reading(offset_secs: i64, severity: &str, temp: f64, battery: f64, energy: f64) -> Event {
    Event {
        device_id: "device-42".to_string(),
        event_type: "reading".to_string(),
        severity: Severity::from(severity),
        timestamp: base() + ChronoDuration::seconds(offset_secs),
        metadata: [
            ("temperature", MetadataValue::Float(temp)),
            ("battery_level", MetadataValue::Int(battery as i64)),
            ("energy_kwh", MetadataValue::Float32(energy as f32)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect(),
    }
}

fn hourly_for(agg: &Aggregator, events: &[Event]) -> Vec<HourlyStats> {
    events
        .iter()
        .map(|event| agg.compute_hourly_stats(event, &agg.extract_features(event)))
        .collect()
}

fn assert_sums_match(a: &HourlyStats, b: &HourlyStats) {
    assert_eq!(a.device_id, b.device_id);
    assert_eq!(a.hour_bucket, b.hour_bucket);
    assert_eq!(a.event_count, b.event_count);
    assert_eq!(a.critical_count, b.critical_count);
    assert_eq!(a.high_count, b.high_count);
    assert_eq!(a.medium_count, b.medium_count);
    assert_eq!(a.low_count, b.low_count);
    assert_eq!(a.temp_count, b.temp_count);
    assert_eq!(a.battery_count, b.battery_count);
    assert_eq!(a.energy_count, b.energy_count);
    assert!((a.temp_sum - b.temp_sum).abs() < 1e-9);
    assert!((a.battery_sum - b.battery_sum).abs() < 1e-9);
    assert!((a.energy_sum - b.energy_sum).abs() < 1e-6);
}

#[test]
fn merging_partitions_matches_single_pass() {
    let agg = Aggregator::new();
    let events = vec![
        reading(60, "critical", 21.5, 90.0, 0.25),
        reading(600, "high", 23.0, 88.0, 0.5),
        reading(1200, "low", 19.5, 87.0, 0.75),
        reading(1800, "medium", 25.0, 85.0, 0.125),
        reading(2400, "other", 22.0, 84.0, 1.0),
        reading(3000, "low", 20.0, 80.0, 0.5),
    ];

    let single = agg.merge_hourly_stats(&hourly_for(&agg, &events)).unwrap();

    for split in 1..events.len() {
        let (left, right) = events.split_at(split);
        let partial_left = agg.merge_hourly_stats(&hourly_for(&agg, left)).unwrap();
        let partial_right = agg.merge_hourly_stats(&hourly_for(&agg, right)).unwrap();
        let merged = agg
            .merge_hourly_stats(&[partial_left, partial_right])
            .unwrap();

        assert_sums_match(&merged, &single);
        // All readings are non-zero, so extremes fold exactly too.
        assert_eq!(merged.temp_min, single.temp_min);
        assert_eq!(merged.temp_max, single.temp_max);
        assert_eq!(merged.battery_min, single.battery_min);
        assert_eq!(merged.battery_max, single.battery_max);
    }

    assert_eq!(single.event_count, 6);
    assert_eq!(single.critical_count + single.high_count, 2);
    assert_eq!(single.temp_min, 19.5);
    assert_eq!(single.temp_max, 25.0);
    assert_eq!(single.battery_min, 80.0);
    assert_eq!(single.battery_max, 90.0);
}

#[test]
fn merging_a_single_partial_is_identity() {
    let agg = Aggregator::new();
    let events = vec![
        reading(5, "high", 21.0, 70.0, 0.5),
        reading(65, "low", 24.0, 68.0, 0.25),
    ];
    let partial = agg.merge_hourly_stats(&hourly_for(&agg, &events)).unwrap();

    let merged = agg.merge_hourly_stats(std::slice::from_ref(&partial)).unwrap();
    assert_eq!(merged, partial);
}

#[test]
fn hourly_rollup_feeds_daily_rollup() {
    let agg = Aggregator::new();
    let hour = |h: i64, count: i64| HourlyStats {
        device_id: "device-42".to_string(),
        hour_bucket: base() + ChronoDuration::hours(h),
        event_count: count,
        ..HourlyStats::default()
    };

    let daily = agg.compute_daily_stats(&[hour(0, 100), hour(1, 80)]).unwrap();
    assert_eq!(daily.event_count, 180);
    assert!((daily.hourly_avg_count - 90.0).abs() < 1e-9);
    assert_eq!(daily.max_hourly_count, 100);
    assert_eq!(daily.uptime_seconds, 7200);
    assert_eq!(daily.day_bucket, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
}

#[test]
fn empty_inputs_degrade_without_failing() {
    let agg = Aggregator::new();
    let calc = Calculator::new();
    let short: Vec<DataPoint> = (0..3)
        .map(|i| DataPoint::new(base() + ChronoDuration::minutes(i), i as f64))
        .collect();

    assert!(agg.compute_daily_stats(&[]).is_none());
    assert!(agg.merge_hourly_stats(&[]).is_none());
    assert!(calc.compute_rolling_average(&[], 3).is_empty());
    assert!(calc.detect_outliers(&short, 1.5).is_empty());
    assert!(calc.compute_delta(&[]).is_empty());
    assert!(calc.compute_rate_of_change(&[]).is_empty());
    assert_eq!(calc.compute_rolling_stats(&[], 2).count, 0);
}

#[test]
fn smoothed_series_stays_within_input_range() {
    let calc = Calculator::new();
    let raw = [12.0, 15.0, 11.0, 30.0, 14.0, 13.0, 12.5];
    let points: Vec<DataPoint> = raw
        .iter()
        .enumerate()
        .map(|(i, v)| DataPoint::new(base() + ChronoDuration::minutes(i as i64), *v))
        .collect();

    for smoothed in [
        calc.compute_exponential_moving_average(&points, 0.3),
        calc.compute_rolling_average(&points, 3),
    ] {
        for p in &smoothed {
            assert!(p.value >= 11.0 && p.value <= 30.0);
        }
    }
    let outliers = calc.detect_outliers(&points, 1.5);
    assert_eq!(outliers.len(), 1);
    assert_eq!(outliers[0].value, 30.0);
}
