//! Historical bootstrap for the series store.
//!
//! The history endpoint answers with positional rows:
//!
//! ```text
//! [id, timestamp, mean, median, std, var, rms, skew, kurtosis, crest, stderr,
//!  rpm?, feed?, depth?, prediction?, healthy_prob?, faulty_prob?, created_at?]
//! ```
//!
//! Trailing context and classification columns may be missing. Rows are put
//! in chronological order and the most recent points per metric are merged
//! into the store (see [`SeriesStore::merge_bootstrap`]).

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RowError;
use crate::source::HistorySource;

use super::metric::{coerce_finite, Metric, MetricValues};
use super::normalize::{Classification, OperatingContext};
use super::series::{ChartPoint, SeriesStore};
use super::time::{format_clock, parse_timestamp, DisplayZone};

const ID_COLUMN: usize = 0;
const TIMESTAMP_COLUMN: usize = 1;
const RPM_COLUMN: usize = 11;
const FEED_COLUMN: usize = 12;
const DEPTH_COLUMN: usize = 13;
const PREDICTION_COLUMN: usize = 14;
const HEALTHY_PROB_COLUMN: usize = 15;
const FAULTY_PROB_COLUMN: usize = 16;

/// One decoded history row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Epoch milliseconds.
    pub timestamp_ms: i64,
    pub values: MetricValues,
    #[serde(skip_serializing_if = "OperatingContext::is_empty")]
    pub context: OperatingContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

impl HistoryRow {
    /// Decode a row given as a JSON value.
    pub fn from_value(row: &Value) -> Result<Self, RowError> {
        match row {
            Value::Array(columns) => Self::from_columns(columns),
            _ => Err(RowError::NotAnArray),
        }
    }

    /// Decode a row from its columns.
    ///
    /// Only the timestamp is required. A missing or non-numeric metric column
    /// leaves that metric absent.
    pub fn from_columns(columns: &[Value]) -> Result<Self, RowError> {
        let timestamp_ms = columns
            .get(TIMESTAMP_COLUMN)
            .and_then(parse_timestamp)
            .ok_or(RowError::Timestamp)?;

        let mut values = MetricValues::new();
        for metric in Metric::ALL {
            values.set(metric, columns.get(metric.history_column()).and_then(coerce_finite));
        }

        Ok(Self {
            id: columns.get(ID_COLUMN).and_then(Value::as_i64),
            timestamp_ms,
            values,
            context: OperatingContext::from_values(
                columns.get(RPM_COLUMN),
                columns.get(FEED_COLUMN),
                columns.get(DEPTH_COLUMN),
            ),
            classification: Classification::from_values(
                columns.get(PREDICTION_COLUMN),
                columns.get(HEALTHY_PROB_COLUMN),
                columns.get(FAULTY_PROB_COLUMN),
            ),
        })
    }
}

/// Decode raw rows, skipping the ones without a usable timestamp.
///
/// Returns the rows in chronological order and the number of skipped rows.
pub fn decode_rows(raw: &[Value]) -> (Vec<HistoryRow>, usize) {
    let mut skipped = 0;
    let mut rows: Vec<HistoryRow> = raw
        .iter()
        .enumerate()
        .filter_map(|(index, row)| match HistoryRow::from_value(row) {
            Ok(row) => Some(row),
            Err(e) => {
                debug!("Skipping history row {}: {}", index, e);
                skipped += 1;
                None
            }
        })
        .collect();

    // The endpoint returns newest first; a stable sort keeps ties in order.
    rows.sort_by_key(|row| row.timestamp_ms);
    (rows, skipped)
}

/// Chart points for one metric, oldest first, limited to the last `limit`.
pub fn points_for(
    rows: &[HistoryRow],
    metric: Metric,
    zone: DisplayZone,
    limit: usize,
) -> Vec<ChartPoint> {
    let points: Vec<ChartPoint> = rows
        .iter()
        .filter_map(|row| {
            let value = row.values.get(metric)?;
            Some(ChartPoint::new(
                format_clock(row.timestamp_ms, zone),
                value,
                row.timestamp_ms,
            ))
        })
        .collect();

    let skip = points.len().saturating_sub(limit);
    points.into_iter().skip(skip).collect()
}

/// Merge decoded rows into `store`. Returns the points kept per metric.
pub fn seed_store(
    rows: &[HistoryRow],
    store: &SeriesStore,
    zone: DisplayZone,
) -> BTreeMap<Metric, usize> {
    Metric::ALL
        .iter()
        .filter_map(|metric| {
            let points = points_for(rows, *metric, zone, store.capacity());
            if points.is_empty() {
                return None;
            }
            Some((*metric, store.merge_bootstrap(*metric, points)))
        })
        .collect()
}

/// Summary of a bootstrap run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BootstrapReport {
    /// Rows decoded successfully.
    pub rows: usize,
    /// Rows dropped because they could not be decoded.
    pub skipped_rows: usize,
    /// Points merged into each metric's series.
    pub seeded: BTreeMap<Metric, usize>,
    /// Set when the fetch itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BootstrapReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn seeded_points(&self) -> usize {
        self.seeded.values().sum()
    }
}

/// Fetch history from `source` and merge it into `store`.
///
/// Never fails: a fetch error leaves the store as it was and is recorded in
/// the report.
pub async fn bootstrap(
    source: &dyn HistorySource,
    store: &SeriesStore,
    zone: DisplayZone,
) -> BootstrapReport {
    let raw = match source.fetch_history().await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("History bootstrap from {} failed: {}", source.description(), e);
            return BootstrapReport {
                error: Some(e.to_string()),
                ..Default::default()
            };
        }
    };

    let (rows, skipped_rows) = decode_rows(&raw);
    if skipped_rows > 0 {
        warn!("Skipped {} undecodable history rows", skipped_rows);
    }

    let seeded = seed_store(&rows, store, zone);
    let report = BootstrapReport {
        rows: rows.len(),
        skipped_rows,
        seeded,
        error: None,
    };
    info!(
        "Bootstrapped {} points from {} history rows",
        report.seeded_points(),
        report.rows
    );
    report
}
