//! # lathewatch
//!
//! Real-time telemetry ingestion for a lathe sensor dashboard.
//!
//! A sensor-processing backend computes statistical features of the spindle
//! signal (mean, median, RMS, standard deviation, variance, skewness,
//! kurtosis, crest factor, standard error) and streams them over a
//! WebSocket. This crate keeps that stream connected, normalizes its loosely
//! shaped frames, merges it with the backend's history and exposes one
//! bounded time series per metric to whatever draws the charts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          TelemetryHub                            │
//! │                                                                  │
//! │  ┌───────────┐  frames   ┌────────────┐  points  ┌────────────┐  │
//! │  │  source   │──────────▶│    data    │─────────▶│ SeriesStore│  │
//! │  │(Connector,│           │(Normalizer)│          │ (30/metric)│  │
//! │  │ manager)  │           └────────────┘          └─────▲──────┘  │
//! │  └─────┬─────┘                                         │ merge   │
//! │        │ frames, status  ┌────────────┐          ┌─────┴──────┐  │
//! │        └────────────────▶│ subscribe  │          │  history   │  │
//! │                          │ (registry) │          │ bootstrap  │  │
//! │                          └─────┬──────┘          └────────────┘  │
//! └────────────────────────────────┼─────────────────────────────────┘
//!                                  ▼
//!                              consumers
//! ```
//!
//! - **[`source`]**: Transports behind the [`Connector`](source::Connector)
//!   trait (WebSocket, in-process channels), the reconnecting
//!   [`ConnectionManager`](source::ConnectionManager) and the HTTP
//!   [`HistoryClient`](source::HistoryClient)
//! - **[`data`]**: Metric vocabulary, frame normalization, timestamps, the
//!   bounded [`SeriesStore`](data::SeriesStore) and the history bootstrap
//! - **[`subscribe`]**: Message and status subscriptions
//! - **[`hub`]**: The [`TelemetryHub`] tying it all together
//! - **[`config`]**: File and environment configuration
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Stream from the default backend, logging a summary every 5 seconds
//! lathewatch --connect ws://127.0.0.1:8000/ws --summary-every 5
//!
//! # Print the newest stored reading and exit
//! lathewatch --history http://127.0.0.1:8000 --latest
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use std::sync::Arc;
//! use lathewatch::{HubOptions, TelemetryHub};
//! use lathewatch::data::Metric;
//! use lathewatch::source::{HistoryClient, WebSocketConnector};
//! use lathewatch::subscribe::{MessageCallback, StatusCallback};
//!
//! # tokio_test::block_on(async {
//! let hub = TelemetryHub::new(
//!     Arc::new(WebSocketConnector::new("ws://127.0.0.1:8000/ws")),
//!     HubOptions::default(),
//! );
//!
//! let on_status: StatusCallback = Arc::new(|up: bool| println!("connected: {}", up));
//! let _status = hub.subscribe_status(on_status);
//!
//! // The first message subscriber opens the connection
//! let on_frame: MessageCallback = Arc::new(|_frame: &serde_json::Value| {});
//! let _frames = hub.subscribe_messages(on_frame);
//!
//! let history = HistoryClient::builder().build().unwrap();
//! let report = hub.bootstrap(&history).await;
//! println!("seeded {} points", report.seeded_points());
//!
//! for point in hub.series(Metric::Rms) {
//!     println!("{} {}", point.time, point.value);
//! }
//! # });
//! ```
//!
//! ### Bridging another source
//!
//! ```
//! use std::sync::Arc;
//! use lathewatch::{HubOptions, TelemetryHub};
//! use lathewatch::source::ChannelConnector;
//!
//! // Frames pushed into the link are handled exactly like WebSocket frames
//! let (offers, connector) = ChannelConnector::create("rabbitmq://localhost");
//! let hub = TelemetryHub::new(Arc::new(connector), HubOptions::default());
//! let link = offers.accept();
//! link.send(r#"{"timestamp": 1700000000, "mean": 0.42}"#);
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod hub;
pub mod source;
pub mod subscribe;

// Re-export main types for convenience
pub use config::Settings;
pub use data::{BootstrapReport, ChartPoint, DisplayZone, Metric, SeriesStore, TelemetryRecord};
pub use error::{BootstrapError, TransportError};
pub use hub::{HubOptions, TelemetryHub};
pub use source::{ConnectionPhase, Connector, HistorySource};
pub use subscribe::{StartPolicy, Subscription};
