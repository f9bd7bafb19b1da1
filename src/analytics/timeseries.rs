//! Windowing, bucketing and resampling helpers for ascending `DataPoint`
//! series. Non-positive durations and counts degrade to empty or pass-through
//! results.

use super::buckets::truncate_to;
use super::types::DataPoint;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub points: Vec<DataPoint>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Nearest,
    Forward,
    Backward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Resample {
    #[default]
    Mean,
    Sum,
    Min,
    Max,
    First,
    Last,
}

impl Resample {
    /// Unknown names fall back to `Mean`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sum" => Resample::Sum,
            "min" => Resample::Min,
            "max" => Resample::Max,
            "first" => Resample::First,
            "last" => Resample::Last,
            _ => Resample::Mean,
        }
    }

    fn apply(self, points: &[DataPoint]) -> Option<f64> {
        let first = points.first()?;
        let last = points.last()?;
        let value = match self {
            Resample::Mean => points.iter().map(|p| p.value).sum::<f64>() / points.len() as f64,
            Resample::Sum => points.iter().map(|p| p.value).sum(),
            Resample::Min => points.iter().map(|p| p.value).fold(first.value, f64::min),
            Resample::Max => points.iter().map(|p| p.value).fold(first.value, f64::max),
            Resample::First => first.value,
            Resample::Last => last.value,
        };
        Some(value)
    }
}

pub fn tumbling_windows(points: &[DataPoint], size: ChronoDuration) -> Vec<Window> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    if size <= ChronoDuration::zero() {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut current = open_window(truncate_to(first.timestamp, size), size);
    for point in points {
        if point.timestamp < current.end {
            current.points.push(*point);
            continue;
        }
        let next = open_window(truncate_to(point.timestamp, size), size);
        let finished = std::mem::replace(&mut current, next);
        if !finished.points.is_empty() {
            windows.push(finished);
        }
        current.points.push(*point);
    }
    if !current.points.is_empty() {
        windows.push(current);
    }

    tracing::debug!(
        component = "timeseries",
        input_points = points.len(),
        windows = windows.len(),
        window_seconds = size.num_seconds(),
        "created tumbling windows"
    );
    windows
}

pub fn sliding_windows(
    points: &[DataPoint],
    size: ChronoDuration,
    slide: ChronoDuration,
) -> Vec<Window> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Vec::new();
    };
    if size <= ChronoDuration::zero() || slide <= ChronoDuration::zero() {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut start = truncate_to(first.timestamp, slide);
    while start < last.timestamp {
        let end = window_end(start, size);
        let members: Vec<DataPoint> = points
            .iter()
            .filter(|p| p.timestamp >= start && p.timestamp < end)
            .copied()
            .collect();
        if !members.is_empty() {
            windows.push(Window {
                start,
                end,
                points: members,
            });
        }
        match start.checked_add_signed(slide) {
            Some(next) => start = next,
            None => break,
        }
    }

    tracing::debug!(
        component = "timeseries",
        input_points = points.len(),
        windows = windows.len(),
        window_seconds = size.num_seconds(),
        slide_seconds = slide.num_seconds(),
        "created sliding windows"
    );
    windows
}

/// Splits the series wherever two consecutive points are more than `gap`
/// apart. Each session spans its first to its last point.
pub fn session_windows(points: &[DataPoint], gap: ChronoDuration) -> Vec<Window> {
    let Some(first) = points.first() else {
        return Vec::new();
    };

    let mut windows = Vec::new();
    let mut current = Window {
        start: first.timestamp,
        end: first.timestamp,
        points: vec![*first],
    };
    for pair in points.windows(2) {
        let (prev, point) = (pair[0], pair[1]);
        if point.timestamp - prev.timestamp <= gap {
            current.points.push(point);
            current.end = point.timestamp;
            continue;
        }
        let next = Window {
            start: point.timestamp,
            end: point.timestamp,
            points: vec![point],
        };
        windows.push(std::mem::replace(&mut current, next));
    }
    windows.push(current);

    tracing::debug!(
        component = "timeseries",
        input_points = points.len(),
        windows = windows.len(),
        gap_seconds = gap.num_seconds(),
        "created session windows"
    );
    windows
}

pub fn bucket_by_time(
    points: &[DataPoint],
    size: ChronoDuration,
) -> BTreeMap<DateTime<Utc>, Vec<DataPoint>> {
    let mut buckets: BTreeMap<DateTime<Utc>, Vec<DataPoint>> = BTreeMap::new();
    if size <= ChronoDuration::zero() {
        return buckets;
    }
    for point in points {
        buckets
            .entry(truncate_to(point.timestamp, size))
            .or_default()
            .push(*point);
    }
    buckets
}

/// Fills gaps wider than `expected` with synthetic points spaced `expected`
/// apart.
pub fn interpolate_missing(
    points: &[DataPoint],
    expected: ChronoDuration,
    method: Interpolation,
) -> Vec<DataPoint> {
    if points.len() < 2 || expected <= ChronoDuration::zero() {
        return points.to_vec();
    }
    let Some(step_ms) = positive_millis(expected) else {
        return points.to_vec();
    };

    let mut result = Vec::with_capacity(points.len());
    result.push(points[0]);
    for pair in points.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        let gap_ms = (curr.timestamp - prev.timestamp).num_milliseconds();
        if gap_ms > step_ms {
            let missing = gap_ms / step_ms;
            for j in 1..missing {
                let value = match method {
                    Interpolation::Linear => {
                        let fraction = j as f64 / missing as f64;
                        prev.value + fraction * (curr.value - prev.value)
                    }
                    Interpolation::Nearest if j < missing / 2 => prev.value,
                    Interpolation::Nearest => curr.value,
                    Interpolation::Forward => prev.value,
                    Interpolation::Backward => curr.value,
                };
                let ts = prev.timestamp + ChronoDuration::milliseconds(step_ms * j);
                result.push(DataPoint::new(ts, value));
            }
        }
        result.push(curr);
    }

    tracing::debug!(
        component = "timeseries",
        input_points = points.len(),
        output_points = result.len(),
        method = ?method,
        "interpolated missing values"
    );
    result
}

/// Re-buckets the series at `interval`, one aggregated point per non-empty
/// bucket, ascending.
pub fn resample(points: &[DataPoint], interval: ChronoDuration, aggregation: Resample) -> Vec<DataPoint> {
    let result: Vec<DataPoint> = bucket_by_time(points, interval)
        .into_iter()
        .filter_map(|(bucket, members)| {
            aggregation
                .apply(&members)
                .map(|value| DataPoint::new(bucket, value))
        })
        .collect();

    tracing::debug!(
        component = "timeseries",
        input_points = points.len(),
        output_points = result.len(),
        aggregation = ?aggregation,
        "resampled series"
    );
    result
}

pub fn downsample(points: &[DataPoint], target: usize) -> Vec<DataPoint> {
    if points.len() <= target {
        return points.to_vec();
    }
    let step = points.len() as f64 / target as f64;
    let last = points.len() - 1;
    (0..target)
        .map(|i| points[((i as f64 * step).round() as usize).min(last)])
        .collect()
}

pub fn align_timestamps(points: &[DataPoint], interval: ChronoDuration) -> Vec<DataPoint> {
    points
        .iter()
        .map(|p| DataPoint::new(truncate_to(p.timestamp, interval), p.value))
        .collect()
}

pub fn window_statistics(windows: &[Window]) -> Vec<Option<WindowStats>> {
    windows
        .iter()
        .map(|window| {
            let first = window.points.first()?;
            let mut stats = WindowStats {
                count: window.points.len(),
                sum: 0.0,
                mean: 0.0,
                min: first.value,
                max: first.value,
            };
            for point in &window.points {
                stats.sum += point.value;
                stats.min = stats.min.min(point.value);
                stats.max = stats.max.max(point.value);
            }
            stats.mean = stats.sum / stats.count as f64;
            Some(stats)
        })
        .collect()
}

fn open_window(start: DateTime<Utc>, size: ChronoDuration) -> Window {
    Window {
        start,
        end: window_end(start, size),
        points: Vec::new(),
    }
}

/// Window ends past the representable range clamp to the latest instant.
fn window_end(start: DateTime<Utc>, size: ChronoDuration) -> DateTime<Utc> {
    start
        .checked_add_signed(size)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn positive_millis(duration: ChronoDuration) -> Option<i64> {
    let ms = duration.num_milliseconds();
    (ms > 0).then_some(ms)
}
