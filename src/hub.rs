//! The telemetry hub: one object owning the connection, the subscribers and
//! the series.
//!
//! ```text
//!  Connector ──▶ ConnectionManager ──on_frame──▶ Normalizer ──▶ SeriesStore
//!                       │                   │
//!                       │                   └──▶ message subscribers (raw frame)
//!                       └──on_status──▶ status subscribers
//!
//!  HistorySource ──▶ bootstrap() ──merge──▶ SeriesStore
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use crate::data::history::{self, BootstrapReport};
use crate::data::{
    ChartPoint, DisplayZone, Ingest, Metric, Normalizer, SeriesStore, TelemetryRecord,
    SERIES_CAPACITY,
};
use crate::source::{
    ConnectionEvents, ConnectionManager, ConnectionPhase, Connector, HistorySource,
    DEFAULT_RECONNECT_DELAY,
};
use crate::subscribe::{MessageCallback, StartPolicy, StatusCallback, Subscription, SubscriptionRegistry};

/// Tuning for a [`TelemetryHub`].
#[derive(Debug, Clone, PartialEq)]
pub struct HubOptions {
    pub reconnect_delay: Duration,
    pub start_policy: StartPolicy,
    pub zone: DisplayZone,
    /// Points kept per metric.
    pub capacity: usize,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            start_policy: StartPolicy::default(),
            zone: DisplayZone::default(),
            capacity: SERIES_CAPACITY,
        }
    }
}

struct HubCore {
    registry: SubscriptionRegistry,
    store: Arc<SeriesStore>,
    normalizer: Normalizer,
    latest: Mutex<Option<TelemetryRecord>>,
}

impl ConnectionEvents for HubCore {
    fn on_status(&self, connected: bool) {
        info!(
            "Telemetry stream {}",
            if connected { "connected" } else { "disconnected" }
        );
        self.registry.broadcast_status(connected);
    }

    fn on_frame(&self, frame: &Value) {
        match self.normalizer.ingest(frame, &self.store) {
            Ingest::Appended { record, points } => {
                debug!("Appended {} points at {}", points, record.timestamp_ms);
                *self.latest.lock() = Some(record);
            }
            Ingest::Ignored(reason) => debug!("Frame not charted: {:?}", reason),
        }
        self.registry.broadcast_message(frame);
    }
}

/// Owns one streaming connection and everything fed by it.
///
/// Dropping the hub stops the connection.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use lathewatch::{HubOptions, TelemetryHub};
/// use lathewatch::data::Metric;
/// use lathewatch::source::WebSocketConnector;
/// use lathewatch::subscribe::MessageCallback;
///
/// # async fn run() {
/// let hub = TelemetryHub::new(
///     Arc::new(WebSocketConnector::new("ws://127.0.0.1:8000/ws")),
///     HubOptions::default(),
/// );
///
/// let on_frame: MessageCallback = Arc::new(|frame: &serde_json::Value| println!("{}", frame));
/// let _subscription = hub.subscribe_messages(on_frame);
///
/// let means = hub.series(Metric::Mean);
/// # }
/// ```
pub struct TelemetryHub {
    core: Arc<HubCore>,
    connection: ConnectionManager,
    policy: StartPolicy,
}

impl TelemetryHub {
    pub fn new(connector: Arc<dyn Connector>, options: HubOptions) -> Self {
        let core = Arc::new(HubCore {
            registry: SubscriptionRegistry::new(),
            store: Arc::new(SeriesStore::with_capacity(options.capacity)),
            normalizer: Normalizer::new(options.zone),
            latest: Mutex::new(None),
        });
        let connection = ConnectionManager::new(connector, core.clone(), options.reconnect_delay);

        Self {
            core,
            connection,
            policy: options.start_policy,
        }
    }

    /// Open the connection. No-op if it is already running.
    pub fn start(&self) {
        self.connection.start();
    }

    /// Close the connection and cancel any pending reconnect.
    pub fn stop(&self) {
        self.connection.stop();
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.connection.phase()
    }

    pub fn endpoint(&self) -> &str {
        self.connection.endpoint()
    }

    /// Receive every frame the connection delivers, charted or not.
    ///
    /// Starts the connection unless the hub uses [`StartPolicy::Manual`].
    /// Unsubscribing never stops it.
    pub fn subscribe_messages(&self, callback: MessageCallback) -> Subscription {
        let subscription = self.core.registry.subscribe_messages(callback);
        if self.policy.starts_on_message_subscribe() {
            self.connection.start();
        }
        subscription
    }

    /// Receive connection status transitions.
    ///
    /// The callback is invoked once with the current status before this
    /// returns.
    pub fn subscribe_status(&self, callback: StatusCallback) -> Subscription {
        self.connection
            .with_status(|current| self.core.registry.subscribe_status(callback, current))
    }

    /// Snapshot of one metric's series, oldest first.
    pub fn series(&self, metric: Metric) -> Vec<ChartPoint> {
        self.core.store.get(metric)
    }

    pub fn store(&self) -> Arc<SeriesStore> {
        self.core.store.clone()
    }

    /// The most recent record decoded from the stream.
    pub fn latest_record(&self) -> Option<TelemetryRecord> {
        self.core.latest.lock().clone()
    }

    pub fn zone(&self) -> DisplayZone {
        self.core.normalizer.zone()
    }

    /// Seed the series from `source`.
    ///
    /// May run while the stream is live: only points older than what the
    /// stream already delivered are kept.
    pub async fn bootstrap(&self, source: &dyn HistorySource) -> BootstrapReport {
        history::bootstrap(source, &self.core.store, self.zone()).await
    }
}

impl std::fmt::Debug for TelemetryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryHub")
            .field("connection", &self.connection)
            .field("policy", &self.policy)
            .field("subscribers", &self.core.registry)
            .finish()
    }
}
