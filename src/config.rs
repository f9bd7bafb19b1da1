use crate::analytics::{DEFAULT_EMA_ALPHA, FEATURE_TEMPERATURE};
use crate::pipeline::SeriesSettings;
use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_WINDOW_SIZE: usize = 12;
const DEFAULT_OUTLIER_THRESHOLD: f64 = 1.5;

fn setup_config_path() -> Option<PathBuf> {
    env_value("ROLLUP_SETUP_CONFIG_PATH").map(PathBuf::from)
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_value(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SetupConfigOverrides {
    #[serde(default)]
    input_path: Option<String>,
    #[serde(default)]
    workers: Option<usize>,
    #[serde(default)]
    window_size: Option<usize>,
    #[serde(default)]
    ema_alpha: Option<f64>,
    #[serde(default)]
    outlier_threshold: Option<f64>,
    #[serde(default)]
    series_feature: Option<String>,
}

fn load_setup_config_overrides() -> Option<SetupConfigOverrides> {
    let path = setup_config_path()?;
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "device-rollup failed to read setup config; using env defaults"
            );
            return None;
        }
    };
    parse_setup_overrides(contents).or_else(|| {
        tracing::warn!(
            path = %path.display(),
            "device-rollup failed to parse setup config; using env defaults"
        );
        None
    })
}

fn parse_setup_overrides(contents: String) -> Option<SetupConfigOverrides> {
    let mut bytes = contents.into_bytes();
    simd_json::serde::from_slice(&mut bytes).ok()
}

#[derive(Clone, Debug)]
pub struct Config {
    pub input_path: PathBuf,
    pub workers: usize,
    pub window_size: usize,
    pub ema_alpha: f64,
    pub outlier_threshold: f64,
    pub series_feature: String,
    pub otlp_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let overrides = load_setup_config_overrides().unwrap_or_default();
        Self::resolve(overrides)
    }

    fn resolve(overrides: SetupConfigOverrides) -> Result<Self> {
        let input_path = env_value("ROLLUP_INPUT_PATH")
            .or_else(|| {
                overrides
                    .input_path
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
            })
            .map(PathBuf::from)
            .context("ROLLUP_INPUT_PATH is required (or present as input_path in the setup config)")?;

        let workers = env_parsed::<usize>("ROLLUP_WORKERS")
            .or(overrides.workers)
            .filter(|v| *v != 0)
            .unwrap_or(DEFAULT_WORKERS);
        let window_size = env_parsed::<usize>("ROLLUP_WINDOW_SIZE")
            .or(overrides.window_size)
            .filter(|v| *v != 0)
            .unwrap_or(DEFAULT_WINDOW_SIZE);
        // Out-of-range values are passed through; the calculator substitutes its default.
        let ema_alpha = env_parsed::<f64>("ROLLUP_EMA_ALPHA")
            .or(overrides.ema_alpha)
            .unwrap_or(DEFAULT_EMA_ALPHA);
        let outlier_threshold = env_parsed::<f64>("ROLLUP_OUTLIER_THRESHOLD")
            .or(overrides.outlier_threshold)
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(DEFAULT_OUTLIER_THRESHOLD);
        let series_feature = env_value("ROLLUP_SERIES_FEATURE")
            .or(overrides.series_feature)
            .unwrap_or_else(|| FEATURE_TEMPERATURE.to_string());
        let otlp_endpoint = env_value("OTEL_EXPORTER_OTLP_ENDPOINT");

        Ok(Self {
            input_path,
            workers,
            window_size,
            ema_alpha,
            outlier_threshold,
            series_feature,
            otlp_endpoint,
        })
    }

    pub fn series_settings(&self) -> SeriesSettings {
        SeriesSettings {
            feature: self.series_feature.clone(),
            window_size: self.window_size,
            ema_alpha: self.ema_alpha,
            outlier_threshold: self.outlier_threshold,
        }
    }
}
