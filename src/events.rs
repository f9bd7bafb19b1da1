use crate::analytics::{Event, MetadataValue, Severity};
use chrono::{DateTime, TimeZone, Utc};
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufRead;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid event payload: {0}")]
    Json(#[from] simd_json::Error),
    #[error("event payload is missing `{0}`")]
    MissingField(&'static str),
    #[error("invalid event timestamp: {0}")]
    InvalidTimestamp(String),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    timestamp: Option<RawTimestamp>,
    #[serde(default)]
    metadata: Option<HashMap<String, RawMetadata>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Str(String),
    Int(i64),
    Float(f64),
}

impl RawTimestamp {
    fn to_datetime(&self) -> Result<DateTime<Utc>, EventError> {
        match self {
            RawTimestamp::Str(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|err| EventError::InvalidTimestamp(format!("{s:?}: {err}"))),
            RawTimestamp::Int(ms) => Utc
                .timestamp_millis_opt(*ms)
                .single()
                .ok_or_else(|| EventError::InvalidTimestamp(ms.to_string())),
            RawTimestamp::Float(secs) => {
                if !secs.is_finite() {
                    return Err(EventError::InvalidTimestamp(secs.to_string()));
                }
                Utc.timestamp_millis_opt((*secs * 1000.0) as i64)
                    .single()
                    .ok_or_else(|| EventError::InvalidTimestamp(secs.to_string()))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMetadata {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Nested(IgnoredAny),
}

impl RawMetadata {
    fn into_value(self) -> Option<MetadataValue> {
        match self {
            RawMetadata::Null => Some(MetadataValue::Null),
            RawMetadata::Bool(v) => Some(MetadataValue::Bool(v)),
            RawMetadata::Int(v) => Some(MetadataValue::Int(v)),
            RawMetadata::Float(v) => Some(MetadataValue::Float(v)),
            RawMetadata::Str(v) => Some(MetadataValue::Str(v)),
            RawMetadata::Nested(_) => None,
        }
    }
}

/// Decodes one JSON event object. The buffer is used as scratch space by the
/// parser and is left in an unspecified state.
pub fn parse_event(payload: &mut [u8]) -> Result<Event, EventError> {
    let raw: RawEvent = simd_json::serde::from_slice(payload)?;

    let device_id = raw
        .device_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(EventError::MissingField("device_id"))?
        .to_string();
    let timestamp = raw
        .timestamp
        .as_ref()
        .ok_or(EventError::MissingField("timestamp"))?
        .to_datetime()?;
    let metadata = raw
        .metadata
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| value.into_value().map(|v| (key, v)))
        .collect();

    Ok(Event {
        device_id,
        event_type: raw.event_type.unwrap_or_default(),
        severity: Severity::from(raw.severity.as_deref().unwrap_or_default()),
        timestamp,
        metadata,
    })
}

#[derive(Debug, Default)]
pub struct ParsedEvents {
    pub events: Vec<Event>,
    pub rejected: usize,
}

/// Reads newline-delimited JSON events, skipping blank lines. Undecodable
/// lines are logged and counted rather than aborting the read.
pub fn parse_event_lines<R: BufRead>(reader: R) -> std::io::Result<ParsedEvents> {
    let mut parsed = ParsedEvents::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut bytes = line.into_bytes();
        match parse_event(&mut bytes) {
            Ok(event) => parsed.events.push(event),
            Err(err) => {
                parsed.rejected += 1;
                tracing::warn!(line = idx + 1, error = %err, "skipping undecodable event");
            }
        }
    }
    tracing::debug!(
        events = parsed.events.len(),
        rejected = parsed.rejected,
        "decoded event lines"
    );
    Ok(parsed)
}
