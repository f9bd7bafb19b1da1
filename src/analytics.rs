mod aggregator;
mod buckets;
mod calculator;
pub mod timeseries;
mod types;

#[cfg(test)]
mod tests;

pub use aggregator::Aggregator;
pub use buckets::{day_bucket, hour_bucket, truncate_to};
pub use calculator::{Calculator, DEFAULT_EMA_ALPHA};
pub use types::{
    DailyStats, DataPoint, Event, HourlyStats, MetadataValue, Percentiles, RollingStats,
    Severity, TimeFeatures,
};

pub const FEATURE_TEMPERATURE: &str = "temperature";
pub const FEATURE_BATTERY_LEVEL: &str = "battery_level";
pub const FEATURE_ENERGY_KWH: &str = "energy_kwh";

const SECONDS_PER_HOUR: i64 = 3600;
