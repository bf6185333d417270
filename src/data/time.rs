//! Timestamp interpretation and chart clock labels.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::metric::coerce_finite;

/// Raw timestamps below this magnitude are epoch seconds, at or above it epoch milliseconds.
pub const MILLIS_THRESHOLD: f64 = 1e12;

/// Latest accepted instant, 9999-12-31T23:59:59.999Z.
pub const MAX_EPOCH_MILLIS: i64 = 253_402_300_799_999;

/// Field names carrying the frame timestamp, highest priority first.
pub const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "ts", "time"];

/// Naive layouts accepted for textual timestamps (interpreted as UTC).
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Time zone used to render chart labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayZone {
    /// The host's local time zone.
    #[default]
    Local,
    Utc,
}

/// Convert a raw epoch number (seconds or milliseconds) to milliseconds.
///
/// Returns `None` for zero, negative or non-finite input and for instants
/// past [`MAX_EPOCH_MILLIS`].
pub fn to_epoch_millis(raw: f64) -> Option<i64> {
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    let millis = if raw < MILLIS_THRESHOLD { raw * 1000.0 } else { raw };
    if millis > MAX_EPOCH_MILLIS as f64 {
        return None;
    }
    Some(millis.round() as i64)
}

/// Interpret a JSON timestamp: numbers, numeric strings, RFC 3339 or
/// `YYYY-MM-DD HH:MM:SS[.fff]` strings.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    if let Some(n) = coerce_finite(value) {
        return to_epoch_millis(n);
    }
    match value {
        Value::String(s) => parse_datetime(s.trim()),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<i64> {
    let millis = match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => dt.timestamp_millis(),
        Err(_) => NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())?
            .and_utc()
            .timestamp_millis(),
    };
    (1..=MAX_EPOCH_MILLIS).contains(&millis).then_some(millis)
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render a fixed-width 24-hour `HH:MM:SS` label.
pub fn format_clock(timestamp_ms: i64, zone: DisplayZone) -> String {
    let Some(utc) = DateTime::<Utc>::from_timestamp_millis(timestamp_ms) else {
        return "--:--:--".to_string();
    };
    match zone {
        DisplayZone::Utc => utc.format("%H:%M:%S").to_string(),
        DisplayZone::Local => utc.with_timezone(&Local).format("%H:%M:%S").to_string(),
    }
}
