use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Other(String),
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Other(raw) => raw.as_str(),
        }
    }

    pub fn is_alert(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }
}

impl From<&str> for Severity {
    fn from(raw: &str) -> Self {
        match raw {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            other => Severity::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single metadata value attached to an event.
///
/// Numeric variants keep their source width so feature extraction can decide
/// which ones coerce into `f64`.
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataValue {
    Float(f64),
    Float32(f32),
    Int(i64),
    Int32(i32),
    Bool(bool),
    Str(String),
    Null,
}

impl MetadataValue {
    /// Numeric value as a finite `f64`, `None` for everything else.
    pub fn as_finite_f64(&self) -> Option<f64> {
        let value = match self {
            MetadataValue::Float(v) => *v,
            MetadataValue::Float32(v) => *v as f64,
            MetadataValue::Int(v) => *v as f64,
            MetadataValue::Int32(v) => *v as f64,
            MetadataValue::Bool(_) | MetadataValue::Str(_) | MetadataValue::Null => return None,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<f32> for MetadataValue {
    fn from(value: f32) -> Self {
        MetadataValue::Float32(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Int32(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Str(value.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct Event {
    pub device_id: String,
    pub event_type: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, MetadataValue>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl DataPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Per device, per hour partial aggregate.
///
/// Min/max fields hold `0.0` until a contributing event carries the feature.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HourlyStats {
    pub device_id: String,
    pub hour_bucket: DateTime<Utc>,
    pub event_count: i64,
    pub critical_count: i64,
    pub high_count: i64,
    pub medium_count: i64,
    pub low_count: i64,
    pub temp_sum: f64,
    pub temp_count: i64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub battery_sum: f64,
    pub battery_count: i64,
    pub battery_min: f64,
    pub battery_max: f64,
    pub energy_sum: f64,
    pub energy_count: i64,
}

impl HourlyStats {
    pub fn alert_count(&self) -> i64 {
        self.critical_count + self.high_count
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub device_id: String,
    pub day_bucket: DateTime<Utc>,
    pub event_count: i64,
    pub hourly_avg_count: f64,
    pub max_hourly_count: i64,
    pub alert_count: i64,
    pub uptime_seconds: i64,
    pub temp_avg: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub battery_avg: f64,
    pub battery_min: f64,
    pub energy_total: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingStats {
    pub count: i64,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Calendar decomposition of a UTC timestamp. `day_of_week` counts from
/// Sunday = 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFeatures {
    pub hour_of_day: u32,
    pub day_of_week: u32,
    pub day_of_month: u32,
    pub month: u32,
    pub is_weekend: bool,
    pub is_business_day: bool,
}
