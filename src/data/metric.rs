//! The tracked sensor features and how they are named on the wire.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// A statistical feature computed by the sensor backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Mean,
    Median,
    Rms,
    StdDeviation,
    Variance,
    Skewness,
    Kurtosis,
    CrestFactor,
    StdError,
}

impl Metric {
    /// Number of tracked metrics.
    pub const COUNT: usize = 9;

    /// Every tracked metric, in dashboard order.
    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::Mean,
        Metric::Median,
        Metric::Rms,
        Metric::StdDeviation,
        Metric::Variance,
        Metric::Skewness,
        Metric::Kurtosis,
        Metric::CrestFactor,
        Metric::StdError,
    ];

    /// The field that tells telemetry frames apart from control frames.
    pub const DISCRIMINATOR: Metric = Metric::Mean;

    /// Canonical key, as used in exports.
    pub fn key(self) -> &'static str {
        match self {
            Metric::Mean => "mean",
            Metric::Median => "median",
            Metric::Rms => "rms",
            Metric::StdDeviation => "stdDeviation",
            Metric::Variance => "variance",
            Metric::Skewness => "skewness",
            Metric::Kurtosis => "kurtosis",
            Metric::CrestFactor => "crestFactor",
            Metric::StdError => "stdError",
        }
    }

    /// Human-readable title.
    pub fn title(self) -> &'static str {
        match self {
            Metric::Mean => "Mean",
            Metric::Median => "Median",
            Metric::Rms => "RMS",
            Metric::StdDeviation => "Std Deviation",
            Metric::Variance => "Variance",
            Metric::Skewness => "Skewness",
            Metric::Kurtosis => "Kurtosis",
            Metric::CrestFactor => "Crest Factor",
            Metric::StdError => "Std Error",
        }
    }

    /// Field names accepted for this metric, highest priority first.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Metric::Mean => &["mean"],
            Metric::Median => &["median"],
            Metric::Rms => &["rms"],
            Metric::StdDeviation => &["std", "stdDeviation", "std_dev"],
            Metric::Variance => &["var", "variance"],
            Metric::Skewness => &["skew", "skewness"],
            Metric::Kurtosis => &["kurtosis", "kurt"],
            Metric::CrestFactor => &["crest", "crestFactor", "crest_factor"],
            Metric::StdError => &["stderr", "stdError", "std_error"],
        }
    }

    /// Column of this metric in a positional history row.
    pub fn history_column(self) -> usize {
        match self {
            Metric::Mean => 2,
            Metric::Median => 3,
            Metric::StdDeviation => 4,
            Metric::Variance => 5,
            Metric::Rms => 6,
            Metric::Skewness => 7,
            Metric::Kurtosis => 8,
            Metric::CrestFactor => 9,
            Metric::StdError => 10,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Look up the first alias present in `frame`.
///
/// A key holding JSON `null` counts as absent. The first present alias wins
/// even if its value later fails numeric coercion.
pub fn resolve_alias<'a>(frame: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|alias| frame.get(*alias))
        .find(|value| !value.is_null())
}

/// Coerce a JSON value to a finite number.
///
/// Numbers and numeric strings are accepted; anything else, and any
/// non-finite result, yields `None`.
pub fn coerce_finite(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// One optional finite value per metric.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricValues([Option<f64>; Metric::COUNT]);

impl MetricValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.0[metric.index()]
    }

    /// Store a value; non-finite values are stored as absent.
    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        self.0[metric.index()] = value.filter(|v| v.is_finite());
    }

    /// Iterate `(metric, value)` for every metric, present or not.
    pub fn iter(&self) -> impl Iterator<Item = (Metric, Option<f64>)> + '_ {
        Metric::ALL.iter().map(move |m| (*m, self.get(*m)))
    }

    pub fn present_count(&self) -> usize {
        self.0.iter().filter(|v| v.is_some()).count()
    }
}

/// Serialized as a map of present values keyed by [`Metric::key`].
impl Serialize for MetricValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.present_count()))?;
        for (metric, value) in self.iter() {
            if let Some(value) = value {
                map.serialize_entry(metric.key(), &value)?;
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_resolve_prefers_first_alias() {
        let frame = object(json!({"stdDeviation": 2.0, "std": 1.0}));
        let value = resolve_alias(&frame, Metric::StdDeviation.aliases());
        assert_eq!(value, Some(&json!(1.0)));
    }

    #[test]
    fn test_resolve_falls_back_to_later_alias() {
        let frame = object(json!({"stdDeviation": 2.0}));
        let value = resolve_alias(&frame, Metric::StdDeviation.aliases());
        assert_eq!(value, Some(&json!(2.0)));
    }

    #[test]
    fn test_resolve_skips_null() {
        let frame = object(json!({"std": null, "stdDeviation": 3.0}));
        let value = resolve_alias(&frame, Metric::StdDeviation.aliases());
        assert_eq!(value, Some(&json!(3.0)));

        let frame = object(json!({"std": null}));
        assert!(resolve_alias(&frame, Metric::StdDeviation.aliases()).is_none());
    }

    #[test]
    fn test_coerce_finite() {
        assert_eq!(coerce_finite(&json!(1.5)), Some(1.5));
        assert_eq!(coerce_finite(&json!(" 2.25 ")), Some(2.25));
        assert_eq!(coerce_finite(&json!("NaN")), None);
        assert_eq!(coerce_finite(&json!("inf")), None);
        assert_eq!(coerce_finite(&json!("")), None);
        assert_eq!(coerce_finite(&json!("abc")), None);
        assert_eq!(coerce_finite(&json!(true)), None);
        assert_eq!(coerce_finite(&json!([1])), None);
    }

    #[test]
    fn test_history_columns_are_distinct() {
        let mut columns: Vec<usize> = Metric::ALL.iter().map(|m| m.history_column()).collect();
        columns.sort_unstable();
        assert_eq!(columns, (2..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_metric_values_rejects_non_finite() {
        let mut values = MetricValues::new();
        values.set(Metric::Rms, Some(f64::NAN));
        values.set(Metric::Mean, Some(4.0));
        assert_eq!(values.get(Metric::Rms), None);
        assert_eq!(values.get(Metric::Mean), Some(4.0));
        assert_eq!(values.present_count(), 1);
    }

    #[test]
    fn test_metric_values_serialize_present_only() {
        let mut values = MetricValues::new();
        values.set(Metric::StdDeviation, Some(0.5));
        values.set(Metric::Mean, Some(1.0));
        assert_eq!(
            serde_json::to_value(values).unwrap(),
            json!({"mean": 1.0, "stdDeviation": 0.5})
        );
    }

    #[test]
    fn test_titles_are_distinct() {
        assert_eq!(Metric::Rms.title(), "RMS");
        assert_eq!(Metric::CrestFactor.title(), "Crest Factor");
        let mut titles: Vec<&str> = Metric::ALL.iter().map(|m| m.title()).collect();
        titles.sort_unstable();
        titles.dedup();
        assert_eq!(titles.len(), Metric::COUNT);
    }

    #[test]
    fn test_serde_uses_wire_keys() {
        assert_eq!(serde_json::to_string(&Metric::CrestFactor).unwrap(), "\"crestFactor\"");
        for metric in Metric::ALL {
            let encoded = serde_json::to_value(metric).unwrap();
            assert_eq!(encoded, json!(metric.key()));
        }
    }
}
