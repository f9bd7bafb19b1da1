use anyhow::{bail, Context, Result};
use device_rollup::analytics::Event;
use device_rollup::config::Config;
use device_rollup::events::parse_event_lines;
use device_rollup::pipeline::{DeviceRollup, RollupPipeline};
use std::fs::File;
use std::future::Future;
use std::io::{BufReader, BufWriter, Write};
use std::sync::atomic::Ordering;

const SERVICE_NAME: &str = "device-rollup";

fn init_tracing(config: &Config) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,device_rollup=info".into());
    // stdout carries the rollups, so logs go to stderr.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true);
    let otel_layer = config
        .otlp_endpoint
        .as_deref()
        .and_then(traces_endpoint)
        .map(|endpoint| otlp_tracer(&endpoint))
        .transpose()?
        .map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;
    Ok(())
}

fn otlp_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime::Tokio, trace::Config as TraceConfig, Resource};

    let exporter = opentelemetry_otlp::new_exporter()
        .http()
        .with_endpoint(endpoint);
    let resource = Resource::new(vec![KeyValue::new("service.name", SERVICE_NAME)]);
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(TraceConfig::default().with_resource(resource))
        .install_batch(Tokio)?;
    Ok(tracer)
}

/// The HTTP exporter posts to `/v1/traces`; a bare collector base URL gets
/// the path appended. Blank endpoints disable export.
fn traces_endpoint(base: &str) -> Option<String> {
    let base = base.trim();
    if base.is_empty() {
        return None;
    }
    if base.contains("/v1/traces") {
        return Some(base.to_string());
    }
    Some(format!("{}/v1/traces", base.trim_end_matches('/')))
}

fn write_rollups(rollups: &[DeviceRollup]) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for rollup in rollups {
        serde_json::to_writer(&mut out, rollup)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

async fn rollup_or_interrupt(
    pipeline: &RollupPipeline,
    events: Vec<Event>,
    shutdown: impl Future<Output = ()>,
) -> Result<Vec<DeviceRollup>> {
    tokio::select! {
        biased;
        _ = shutdown => {
            tracing::warn!("shutdown signal received before rollups were written");
            bail!("interrupted before rollups were written");
        }
        res = pipeline.run(events) => res,
    }
}

async fn run(config: &Config) -> Result<()> {
    let file = File::open(&config.input_path)
        .with_context(|| format!("failed to open {}", config.input_path.display()))?;
    let parsed = parse_event_lines(BufReader::new(file))
        .with_context(|| format!("failed to read {}", config.input_path.display()))?;
    tracing::info!(
        path = %config.input_path.display(),
        events = parsed.events.len(),
        rejected = parsed.rejected,
        "loaded events"
    );

    let pipeline = RollupPipeline::new(config.workers, config.series_settings());
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let rollups = rollup_or_interrupt(&pipeline, parsed.events, ctrl_c).await?;

    write_rollups(&rollups)?;

    let stats = pipeline.stats();
    tracing::info!(
        devices = stats.devices.load(Ordering::Relaxed),
        events = stats.events.load(Ordering::Relaxed),
        hourly_buckets = stats.hourly_buckets.load(Ordering::Relaxed),
        daily_buckets = stats.daily_buckets.load(Ordering::Relaxed),
        micros = stats.last_run_micros.load(Ordering::Relaxed),
        "wrote rollups"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let outcome = run(&config).await;
    if let Err(err) = &outcome {
        tracing::error!(error = %err, "rollup failed");
    }
    opentelemetry::global::shutdown_tracer_provider();
    outcome
}
