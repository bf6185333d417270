//! Telemetry data model and processing.
//!
//! This module turns raw frames and history rows into bounded chart series.
//!
//! ## Submodules
//!
//! - [`metric`]: The tracked [`Metric`]s, their wire aliases and value coercion
//! - [`time`]: Epoch timestamp interpretation and `HH:MM:SS` labels
//! - [`normalize`]: Frame decoding ([`Normalizer`], [`Decoded`]) with carry-forward
//! - [`series`]: The bounded per-metric [`SeriesStore`]
//! - [`history`]: Positional history rows and the startup bootstrap
//!
//! ## Data Flow
//!
//! ```text
//! history rows ──▶ history::bootstrap() ──┐
//!                                         ▼
//! raw frame ──▶ Normalizer::decode() ──▶ SeriesStore (30 points per metric)
//!                    │
//!                    └──▶ Decoded::Ignored (control frames)
//! ```

pub mod history;
pub mod metric;
pub mod normalize;
pub mod series;
pub mod time;

pub use history::{BootstrapReport, HistoryRow};
pub use metric::{Metric, MetricValues};
pub use normalize::{
    Classification, Decoded, IgnoreReason, Ingest, Normalizer, OperatingContext, TelemetryRecord,
};
pub use series::{ChartPoint, SeriesStore, SERIES_CAPACITY};
pub use time::DisplayZone;
