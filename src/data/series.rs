//! Bounded per-metric time series.
//!
//! The store is what the presentation layer renders: one FIFO buffer of
//! [`ChartPoint`]s per [`Metric`], capped at [`SERIES_CAPACITY`] entries and
//! kept in non-decreasing time order. Points are never edited after insertion.

use std::collections::{BTreeMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::metric::Metric;

/// Maximum number of points kept per metric.
pub const SERIES_CAPACITY: usize = 30;

/// A single value on a metric chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// `HH:MM:SS` label.
    pub time: String,
    pub value: f64,
    /// Instant the label was derived from, in epoch milliseconds.
    pub timestamp_ms: i64,
}

impl ChartPoint {
    pub fn new(time: impl Into<String>, value: f64, timestamp_ms: i64) -> Self {
        Self {
            time: time.into(),
            value,
            timestamp_ms,
        }
    }
}

/// Thread-safe store of bounded series, one per metric.
///
/// Series are created lazily on first append, replace or merge.
#[derive(Debug)]
pub struct SeriesStore {
    capacity: usize,
    series: RwLock<BTreeMap<Metric, VecDeque<ChartPoint>>>,
}

impl Default for SeriesStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesStore {
    /// Create an empty store with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(SERIES_CAPACITY)
    }

    /// Create an empty store holding at most `capacity` points per metric.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of one metric's series, oldest first.
    pub fn get(&self, metric: Metric) -> Vec<ChartPoint> {
        self.series
            .read()
            .get(&metric)
            .map(|points| points.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, metric: Metric) -> usize {
        self.series.read().get(&metric).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.series.read().values().all(VecDeque::is_empty)
    }

    /// Value of the most recent point for `metric`.
    pub fn last_value(&self, metric: Metric) -> Option<f64> {
        self.series.read().get(&metric)?.back().map(|p| p.value)
    }

    /// Timestamp of the most recent point for `metric`.
    pub fn last_timestamp(&self, metric: Metric) -> Option<i64> {
        self.series.read().get(&metric)?.back().map(|p| p.timestamp_ms)
    }

    /// Append a point, evicting the oldest one at capacity.
    ///
    /// Returns `false` (and leaves the series untouched) when the point is
    /// older than the current tail.
    pub fn append(&self, metric: Metric, point: ChartPoint) -> bool {
        let mut series = self.series.write();
        let points = series.entry(metric).or_default();

        if let Some(last) = points.back() {
            if point.timestamp_ms < last.timestamp_ms {
                return false;
            }
        }

        points.push_back(point);
        while points.len() > self.capacity {
            points.pop_front();
        }
        true
    }

    /// Replace a series, keeping the most recent `capacity` points.
    ///
    /// Input is sorted by timestamp first; the sort is stable so points sharing
    /// a timestamp keep their given order.
    pub fn replace(&self, metric: Metric, mut points: Vec<ChartPoint>) {
        points.sort_by_key(|p| p.timestamp_ms);
        let skip = points.len().saturating_sub(self.capacity);
        let kept: VecDeque<ChartPoint> = points.into_iter().skip(skip).collect();
        self.series.write().insert(metric, kept);
    }

    /// Merge historical points into a series that streaming may already feed.
    ///
    /// Points at or after the first existing point are dropped, so streamed
    /// data always wins; older points are prepended and the result capped.
    /// Returns the number of historical points that survived the merge.
    pub fn merge_bootstrap(&self, metric: Metric, mut points: Vec<ChartPoint>) -> usize {
        points.sort_by_key(|p| p.timestamp_ms);

        let mut series = self.series.write();
        let existing = series.entry(metric).or_default();

        if let Some(first) = existing.front() {
            let cutoff = first.timestamp_ms;
            points.retain(|p| p.timestamp_ms < cutoff);
        }

        let historical = points.len();
        let mut merged: VecDeque<ChartPoint> = points.into_iter().collect();
        merged.extend(existing.drain(..));

        let overflow = merged.len().saturating_sub(self.capacity);
        merged.drain(..overflow);
        let survived = historical.saturating_sub(overflow);

        *existing = merged;
        survived
    }

    /// Snapshot of every series created so far.
    pub fn snapshot(&self) -> BTreeMap<Metric, Vec<ChartPoint>> {
        self.series
            .read()
            .iter()
            .map(|(metric, points)| (*metric, points.iter().cloned().collect()))
            .collect()
    }
}
