//! Raw frame normalization.
//!
//! Turns an untyped JSON frame into a [`TelemetryRecord`] and appends one
//! [`ChartPoint`] per tracked metric to a [`SeriesStore`].
//!
//! Two levels of fallback keep charts continuous:
//!
//! - a metric missing from an otherwise valid frame carries forward the last
//!   stored value for that metric (0 when the series is still empty);
//! - a frame without a `mean` at all is not telemetry and is ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::metric::{coerce_finite, resolve_alias, Metric, MetricValues};
use super::series::{ChartPoint, SeriesStore};
use super::time::{format_clock, now_millis, parse_timestamp, DisplayZone, TIMESTAMP_ALIASES};

/// How far ahead of the local clock a frame timestamp may be and still be used.
pub const MAX_FUTURE_SKEW_MS: i64 = 24 * 60 * 60 * 1000;

/// Machining parameters attached to a reading, passed through as text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatingContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<String>,
}

impl OperatingContext {
    pub(crate) fn from_values(
        rpm: Option<&Value>,
        feed: Option<&Value>,
        depth: Option<&Value>,
    ) -> Self {
        Self {
            rpm: rpm.and_then(value_as_text),
            feed: feed.and_then(value_as_text),
            depth: depth.and_then(value_as_text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rpm.is_none() && self.feed.is_none() && self.depth.is_none()
    }
}

/// Health classification produced by the backend model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Usually `HEALTHY` or `FAULTY`.
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthy_prob: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faulty_prob: Option<f64>,
}

impl Classification {
    pub(crate) fn from_values(
        label: Option<&Value>,
        healthy: Option<&Value>,
        faulty: Option<&Value>,
    ) -> Option<Self> {
        Some(Self {
            label: label.and_then(value_as_text)?,
            healthy_prob: healthy.and_then(coerce_finite),
            faulty_prob: faulty.and_then(coerce_finite),
        })
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Canonical record decoded from one telemetry frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    /// Epoch milliseconds.
    pub timestamp_ms: i64,
    pub values: MetricValues,
    #[serde(skip_serializing_if = "OperatingContext::is_empty")]
    pub context: OperatingContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

/// Why a frame did not produce a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The frame is valid JSON but not an object.
    NotAnObject,
    /// No `mean` field: a control or status frame.
    NotTelemetry,
}

/// Outcome of decoding a raw frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Telemetry(TelemetryRecord),
    Ignored(IgnoreReason),
}

/// Outcome of ingesting a raw frame into a store.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    Appended {
        record: TelemetryRecord,
        /// Number of series that received a point.
        points: usize,
    },
    Ignored(IgnoreReason),
}

/// Converts raw frames into chart points.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    zone: DisplayZone,
}

impl Normalizer {
    pub fn new(zone: DisplayZone) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> DisplayZone {
        self.zone
    }

    /// Decode a frame, stamping it with the current time if it carries none.
    pub fn decode(&self, frame: &Value) -> Decoded {
        self.decode_at(frame, now_millis())
    }

    /// Decode a frame, using `now_ms` when it carries no usable timestamp.
    ///
    /// A timestamp more than [`MAX_FUTURE_SKEW_MS`] ahead of `now_ms` is not
    /// usable: appending it would make every later point look stale.
    pub fn decode_at(&self, frame: &Value, now_ms: i64) -> Decoded {
        let Value::Object(fields) = frame else {
            return Decoded::Ignored(IgnoreReason::NotAnObject);
        };

        if resolve_alias(fields, Metric::DISCRIMINATOR.aliases()).is_none() {
            return Decoded::Ignored(IgnoreReason::NotTelemetry);
        }

        let mut values = MetricValues::new();
        for metric in Metric::ALL {
            let value = resolve_alias(fields, metric.aliases()).and_then(coerce_finite);
            values.set(metric, value);
        }

        let timestamp_ms = resolve_alias(fields, TIMESTAMP_ALIASES)
            .and_then(parse_timestamp)
            .filter(|ts| *ts <= now_ms.saturating_add(MAX_FUTURE_SKEW_MS))
            .unwrap_or(now_ms);

        Decoded::Telemetry(TelemetryRecord {
            timestamp_ms,
            values,
            context: OperatingContext::from_values(
                fields.get("rpm"),
                fields.get("feed"),
                fields.get("depth"),
            ),
            classification: classification(fields),
        })
    }

    /// Append one point per metric for `record`, carrying values forward.
    ///
    /// Returns how many series accepted the point; a record older than a
    /// series tail is rejected by that series.
    pub fn apply(&self, record: &TelemetryRecord, store: &SeriesStore) -> usize {
        let time = format_clock(record.timestamp_ms, self.zone);
        let mut appended = 0;

        for metric in Metric::ALL {
            let value = record
                .values
                .get(metric)
                .or_else(|| store.last_value(metric))
                .unwrap_or(0.0);
            if store.append(metric, ChartPoint::new(time.clone(), value, record.timestamp_ms)) {
                appended += 1;
            }
        }

        appended
    }

    /// Decode `frame` and, if it is telemetry, apply it to `store`.
    pub fn ingest(&self, frame: &Value, store: &SeriesStore) -> Ingest {
        match self.decode(frame) {
            Decoded::Telemetry(record) => {
                let points = self.apply(&record, store);
                Ingest::Appended { record, points }
            }
            Decoded::Ignored(reason) => Ingest::Ignored(reason),
        }
    }
}

fn classification(fields: &Map<String, Value>) -> Option<Classification> {
    Classification::from_values(
        resolve_alias(fields, &["prediction", "label"]),
        fields.get("healthy_prob"),
        fields.get("faulty_prob"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn record(decoded: Decoded) -> TelemetryRecord {
        match decoded {
            Decoded::Telemetry(record) => record,
            Decoded::Ignored(reason) => panic!("frame ignored: {:?}", reason),
        }
    }

    fn full_frame(ts: i64, base: f64) -> Value {
        json!({
            "timestamp": ts,
            "mean": base,
            "median": base + 1.0,
            "rms": base + 2.0,
            "std": base + 3.0,
            "var": base + 4.0,
            "skew": base + 5.0,
            "kurtosis": base + 6.0,
            "crest": base + 7.0,
            "stderr": base + 8.0,
        })
    }

    #[test]
    fn test_decode_resolves_every_metric() {
        let normalizer = Normalizer::new(DisplayZone::Utc);
        let record = record(normalizer.decode_at(&full_frame(1_700_000_000, 10.0), NOW));

        assert_eq!(record.timestamp_ms, 1_700_000_000_000);
        assert_eq!(record.values.present_count(), Metric::COUNT);
        assert_eq!(record.values.get(Metric::StdDeviation), Some(13.0));
        assert_eq!(record.values.get(Metric::StdError), Some(18.0));
    }

    #[test]
    fn test_decode_accepts_long_aliases() {
        let normalizer = Normalizer::new(DisplayZone::Utc);
        let frame = json!({"mean": 1.0, "stdDeviation": 0.5, "crestFactor": "3.5", "stdError": 0.1});
        let record = record(normalizer.decode_at(&frame, NOW));

        assert_eq!(record.values.get(Metric::StdDeviation), Some(0.5));
        assert_eq!(record.values.get(Metric::CrestFactor), Some(3.5));
        assert_eq!(record.values.get(Metric::StdError), Some(0.1));
        assert_eq!(record.values.get(Metric::Median), None);
        // No timestamp: stamped with the supplied clock
        assert_eq!(record.timestamp_ms, NOW);
    }

    #[test]
    fn test_decode_millisecond_timestamp() {
        let normalizer = Normalizer::new(DisplayZone::Utc);
        let frame = json!({"mean": 1.0, "ts": 1_700_000_000_123_i64});
        assert_eq!(record(normalizer.decode_at(&frame, NOW)).timestamp_ms, 1_700_000_000_123);
    }

    #[test]
    fn test_unusable_timestamp_falls_back_to_now() {
        let normalizer = Normalizer::new(DisplayZone::Utc);
        for ts in [json!(1e30), json!(1.7e15), json!(NOW / 1000 + 2 * 86_400), json!("9999-99-99")] {
            let frame = json!({"mean": 1.0, "timestamp": ts});
            assert_eq!(record(normalizer.decode_at(&frame, NOW)).timestamp_ms, NOW, "{}", ts);
        }

        // Small clock skew is tolerated
        let ahead = json!({"mean": 1.0, "timestamp": NOW / 1000 + 60});
        assert_eq!(record(normalizer.decode_at(&ahead, NOW)).timestamp_ms, NOW + 60_000);
    }

    #[test]
    fn test_far_future_frame_does_not_block_later_frames() {
        let normalizer = Normalizer::new(DisplayZone::Utc);
        let store = SeriesStore::new();

        normalizer.apply(&record(normalizer.decode_at(&full_frame(1_699_999_999, 1.0), NOW)), &store);
        let bogus = record(normalizer.decode_at(&json!({"mean": 2.0, "ts": 1e30}), NOW));
        assert_eq!(normalizer.apply(&bogus, &store), Metric::COUNT);

        for n in 1..=5 {
            let frame = full_frame(1_700_000_000 + n, 10.0 + n as f64);
            assert_eq!(normalizer.apply(&record(normalizer.decode_at(&frame, NOW)), &store), Metric::COUNT);
        }

        let means = store.get(Metric::Mean);
        assert_eq!(means.len(), 7);
        assert_eq!(means[1].time, "22:13:20");
        assert_eq!(means.last().map(|p| p.value), Some(15.0));
    }

    #[test]
    fn test_frame_without_mean_is_ignored() {
        let normalizer = Normalizer::new(DisplayZone::Utc);
        let store = SeriesStore::new();

        let frame = json!({"type": "heartbeat", "std": 4.0, "timestamp": 1_700_000_000});
        assert_eq!(
            normalizer.decode_at(&frame, NOW),
            Decoded::Ignored(IgnoreReason::NotTelemetry)
        );
        assert_eq!(
            normalizer.ingest(&frame, &store),
            Ingest::Ignored(IgnoreReason::NotTelemetry)
        );
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_null_mean_is_not_telemetry() {
        let normalizer = Normalizer::default();
        let frame = json!({"mean": null, "rms": 1.0});
        assert_eq!(
            normalizer.decode_at(&frame, NOW),
            Decoded::Ignored(IgnoreReason::NotTelemetry)
        );
    }

    #[test]
    fn test_non_object_frames_are_ignored() {
        let normalizer = Normalizer::default();
        assert_eq!(
            normalizer.decode_at(&json!([1, 2, 3]), NOW),
            Decoded::Ignored(IgnoreReason::NotAnObject)
        );
        assert_eq!(
            normalizer.decode_at(&json!("ping"), NOW),
            Decoded::Ignored(IgnoreReason::NotAnObject)
        );
    }

    #[test]
    fn test_missing_std_carries_forward() {
        let normalizer = Normalizer::new(DisplayZone::Utc);
        let store = SeriesStore::new();

        let first = record(normalizer.decode_at(&full_frame(1_700_000_000, 10.0), NOW));
        assert_eq!(normalizer.apply(&first, &store), Metric::COUNT);

        let partial = record(normalizer.decode_at(&json!({"mean": 20.0, "timestamp": 1_700_000_001}), NOW));
        assert_eq!(normalizer.apply(&partial, &store), Metric::COUNT);

        let std_series = store.get(Metric::StdDeviation);
        assert_eq!(std_series.len(), 2);
        assert_eq!(std_series[1].value, 13.0);
        assert_eq!(store.last_value(Metric::Mean), Some(20.0));
    }

    #[test]
    fn test_missing_std_without_history_is_zero() {
        let normalizer = Normalizer::new(DisplayZone::Utc);
        let store = SeriesStore::new();

        let partial = record(normalizer.decode_at(&json!({"mean": 5.0}), NOW));
        normalizer.apply(&partial, &store);

        assert_eq!(store.last_value(Metric::StdDeviation), Some(0.0));
        assert_eq!(store.last_value(Metric::Mean), Some(5.0));
    }

    #[test]
    fn test_non_finite_value_carries_forward() {
        let normalizer = Normalizer::new(DisplayZone::Utc);
        let store = SeriesStore::new();

        normalizer.apply(&record(normalizer.decode_at(&full_frame(1_700_000_000, 1.0), NOW)), &store);
        let frame = json!({"mean": "NaN", "rms": "oops", "std": 9.0, "timestamp": 1_700_000_002});
        normalizer.apply(&record(normalizer.decode_at(&frame, NOW)), &store);

        assert_eq!(store.last_value(Metric::Mean), Some(1.0));
        assert_eq!(store.last_value(Metric::Rms), Some(3.0));
        assert_eq!(store.last_value(Metric::StdDeviation), Some(9.0));
    }

    #[test]
    fn test_first_alias_wins_even_when_invalid() {
        let normalizer = Normalizer::new(DisplayZone::Utc);
        let frame = json!({"mean": 1.0, "std": "n/a", "stdDeviation": 2.0});
        let record = record(normalizer.decode_at(&frame, NOW));
        assert_eq!(record.values.get(Metric::StdDeviation), None);
    }

    #[test]
    fn test_points_use_display_label() {
        let normalizer = Normalizer::new(DisplayZone::Utc);
        let store = SeriesStore::new();
        normalizer.apply(&record(normalizer.decode_at(&full_frame(1_700_000_000, 0.0), NOW)), &store);

        let point = &store.get(Metric::Kurtosis)[0];
        assert_eq!(point.time, "22:13:20");
        assert_eq!(point.timestamp_ms, 1_700_000_000_000);
        assert_eq!(point.value, 6.0);
    }

    #[test]
    fn test_series_stay_bounded_and_ordered() {
        let normalizer = Normalizer::new(DisplayZone::Utc);
        let store = SeriesStore::new();
        for i in 0..50 {
            let frame = json!({"mean": i, "timestamp": 1_700_000_000 + i});
            normalizer.apply(&record(normalizer.decode_at(&frame, NOW)), &store);
        }

        for metric in Metric::ALL {
            let series = store.get(metric);
            assert_eq!(series.len(), 30);
            assert!(series.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
        }
    }

    #[test]
    fn test_stale_frame_is_not_appended() {
        let normalizer = Normalizer::new(DisplayZone::Utc);
        let store = SeriesStore::new();
        normalizer.apply(&record(normalizer.decode_at(&full_frame(1_700_000_010, 1.0), NOW)), &store);

        let stale = record(normalizer.decode_at(&full_frame(1_700_000_000, 2.0), NOW));
        assert_eq!(normalizer.apply(&stale, &store), 0);
        assert_eq!(store.len(Metric::Mean), 1);
    }

    #[test]
    fn test_context_and_classification() {
        let normalizer = Normalizer::default();
        let frame = json!({
            "mean": 1.0,
            "rpm": 1200,
            "feed": "0.2",
            "prediction": "FAULTY",
            "healthy_prob": 0.1,
            "faulty_prob": "0.9"
        });
        let record = record(normalizer.decode_at(&frame, NOW));

        assert_eq!(record.context.rpm.as_deref(), Some("1200"));
        assert_eq!(record.context.feed.as_deref(), Some("0.2"));
        assert_eq!(record.context.depth, None);

        let class = record.classification.unwrap();
        assert_eq!(class.label, "FAULTY");
        assert_eq!(class.healthy_prob, Some(0.1));
        assert_eq!(class.faulty_prob, Some(0.9));
    }
}
