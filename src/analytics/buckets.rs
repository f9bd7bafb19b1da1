use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

const MILLIS_PER_HOUR: i64 = 3_600_000;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

pub fn hour_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    align_down_ms(ts, MILLIS_PER_HOUR)
}

pub fn day_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    align_down_ms(ts, MILLIS_PER_DAY)
}

/// Floors `ts` to a multiple of `interval` since the Unix epoch. Intervals
/// shorter than a millisecond leave the timestamp untouched.
pub fn truncate_to(ts: DateTime<Utc>, interval: ChronoDuration) -> DateTime<Utc> {
    let interval_ms = interval.num_milliseconds();
    if interval_ms <= 0 {
        return ts;
    }
    align_down_ms(ts, interval_ms)
}

fn align_down_ms(ts: DateTime<Utc>, interval_ms: i64) -> DateTime<Utc> {
    let ts_ms = ts.timestamp_millis();
    let bucket_ms = ts_ms.div_euclid(interval_ms) * interval_ms;
    Utc.timestamp_millis_opt(bucket_ms).single().unwrap_or(ts)
}

/// Elapsed seconds from `from` to `to`, keeping sub-second precision.
pub(crate) fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn hour_and_day_buckets_floor_to_utc_boundaries() {
        let t = ts("2024-03-15T14:37:12.500Z");
        assert_eq!(hour_bucket(t), ts("2024-03-15T14:00:00Z"));
        assert_eq!(day_bucket(t), ts("2024-03-15T00:00:00Z"));
    }

    #[test]
    fn offset_timestamps_bucket_in_utc() {
        let t = DateTime::parse_from_rfc3339("2024-03-15T01:30:00+05:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(hour_bucket(t), ts("2024-03-14T20:00:00Z"));
        assert_eq!(day_bucket(t), ts("2024-03-14T00:00:00Z"));
    }

    #[test]
    fn pre_epoch_timestamps_floor_downwards() {
        let t = ts("1969-12-31T23:30:00Z");
        assert_eq!(hour_bucket(t), ts("1969-12-31T23:00:00Z"));
        assert_eq!(day_bucket(t), ts("1969-12-31T00:00:00Z"));
    }

    #[test]
    fn truncate_ignores_non_positive_intervals() {
        let t = ts("2024-03-15T14:37:12Z");
        assert_eq!(truncate_to(t, ChronoDuration::zero()), t);
        assert_eq!(
            truncate_to(t, ChronoDuration::minutes(15)),
            ts("2024-03-15T14:30:00Z")
        );
    }

    #[test]
    fn seconds_between_keeps_fractions() {
        let a = ts("2024-03-15T14:00:00Z");
        let b = ts("2024-03-15T14:00:01.250Z");
        assert!((seconds_between(a, b) - 1.25).abs() < 1e-9);
        assert!((seconds_between(b, a) + 1.25).abs() < 1e-9);
    }
}
