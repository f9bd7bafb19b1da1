use crate::analytics::{
    day_bucket, Aggregator, Calculator, DailyStats, DataPoint, Event, HourlyStats, Percentiles,
    RollingStats, TimeFeatures,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

#[derive(Clone, Debug)]
pub struct SeriesSettings {
    pub feature: String,
    pub window_size: usize,
    pub ema_alpha: f64,
    pub outlier_threshold: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SeriesSummary {
    pub feature: String,
    pub points: usize,
    pub percentiles: Percentiles,
    pub rolling: RollingStats,
    pub ema_last: Option<f64>,
    pub outliers: Vec<DataPoint>,
    pub latest: Option<TimeFeatures>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeviceRollup {
    pub device_id: String,
    pub hourly: Vec<HourlyStats>,
    pub daily: Vec<DailyStats>,
    pub series: SeriesSummary,
}

#[derive(Debug, Default)]
pub struct RollupStats {
    pub devices: AtomicU64,
    pub events: AtomicU64,
    pub hourly_buckets: AtomicU64,
    pub daily_buckets: AtomicU64,
    pub last_run_micros: AtomicU64,
}

impl RollupStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, rollup: &DeviceRollup, events: usize) {
        self.devices.fetch_add(1, Ordering::Relaxed);
        self.events.fetch_add(events as u64, Ordering::Relaxed);
        self.hourly_buckets
            .fetch_add(rollup.hourly.len() as u64, Ordering::Relaxed);
        self.daily_buckets
            .fetch_add(rollup.daily.len() as u64, Ordering::Relaxed);
    }
}

/// Fans per-device rollups out over the blocking pool, at most `workers` at
/// a time.
#[derive(Clone)]
pub struct RollupPipeline {
    workers: usize,
    settings: SeriesSettings,
    stats: Arc<RollupStats>,
}

impl RollupPipeline {
    pub fn new(workers: usize, settings: SeriesSettings) -> Self {
        Self {
            workers: workers.max(1),
            settings,
            stats: Arc::new(RollupStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<RollupStats> {
        self.stats.clone()
    }

    /// Rolls up every device in `events`. Output is ordered by device id.
    pub async fn run(&self, events: Vec<Event>) -> Result<Vec<DeviceRollup>> {
        let started = Instant::now();
        let mut by_device: BTreeMap<String, Vec<Event>> = BTreeMap::new();
        for event in events {
            by_device
                .entry(event.device_id.clone())
                .or_default()
                .push(event);
        }
        tracing::debug!(devices = by_device.len(), workers = self.workers, "starting rollup");

        let permits = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(by_device.len());
        for (device_id, device_events) in by_device {
            let permit = permits.clone().acquire_owned().await?;
            let settings = self.settings.clone();
            let stats = self.stats.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let count = device_events.len();
                let rollup = rollup_device(device_id, device_events, &settings);
                stats.record(&rollup, count);
                rollup
            }));
        }

        let mut rollups = Vec::with_capacity(handles.len());
        for joined in futures::future::join_all(handles).await {
            rollups.push(joined?);
        }

        let micros = started.elapsed().as_micros() as u64;
        self.stats.last_run_micros.store(micros, Ordering::Relaxed);
        tracing::info!(devices = rollups.len(), micros, "rollup finished");
        Ok(rollups)
    }
}

/// Hourly partials per event, merged per hour, rolled up per day, plus
/// calculator features over the configured metadata series.
pub fn rollup_device(device_id: String, mut events: Vec<Event>, settings: &SeriesSettings) -> DeviceRollup {
    let aggregator = Aggregator::new();
    let calculator = Calculator::new();
    events.sort_by_key(|event| event.timestamp);

    let mut partials: BTreeMap<DateTime<Utc>, Vec<HourlyStats>> = BTreeMap::new();
    let mut points = Vec::new();
    for event in &events {
        let features = aggregator.extract_features(event);
        if let Some(&value) = features.get(settings.feature.as_str()) {
            points.push(DataPoint::new(event.timestamp, value));
        }
        let hourly = aggregator.compute_hourly_stats(event, &features);
        partials.entry(hourly.hour_bucket).or_default().push(hourly);
    }

    let hourly: Vec<HourlyStats> = partials
        .values()
        .filter_map(|batch| aggregator.merge_hourly_stats(batch))
        .collect();

    let mut per_day: BTreeMap<DateTime<Utc>, Vec<HourlyStats>> = BTreeMap::new();
    for stats in &hourly {
        per_day
            .entry(day_bucket(stats.hour_bucket))
            .or_default()
            .push(stats.clone());
    }
    let daily: Vec<DailyStats> = per_day
        .values()
        .filter_map(|day| aggregator.compute_daily_stats(day))
        .collect();

    let series = SeriesSummary {
        feature: settings.feature.clone(),
        points: points.len(),
        percentiles: calculator.compute_percentiles(&points),
        rolling: calculator.compute_rolling_stats(&points, settings.window_size),
        ema_last: calculator
            .compute_exponential_moving_average(&points, settings.ema_alpha)
            .last()
            .map(|p| p.value),
        outliers: calculator.detect_outliers(&points, settings.outlier_threshold),
        latest: points
            .last()
            .map(|p| calculator.extract_time_features(p.timestamp)),
    };

    tracing::debug!(
        device_id = %device_id,
        events = events.len(),
        hourly = hourly.len(),
        daily = daily.len(),
        "rolled up device"
    );

    DeviceRollup {
        device_id,
        hourly,
        daily,
        series,
    }
}
