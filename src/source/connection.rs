//! Connection state machine.
//!
//! ```text
//!            start()
//!   Idle ──────────────▶ Connecting ──established──▶ Connected
//!    ▲                     ▲    │                        │
//!    │ stop()              │    │ refused                │ closed / error
//!    │ (from any state)    │    ▼                        ▼
//!    └──────────────── PendingReconnect ◀────────────────┘
//!                       (fixed delay)
//! ```
//!
//! The manager owns one spawned task per session. Every delivery to
//! [`ConnectionEvents`] happens under a re-entrant lock after checking that
//! the session is still current, which is what lets [`ConnectionManager::stop`]
//! guarantee that nothing is delivered once it returns, even when it is
//! called from inside a callback.
//!
//! Status changes raised while a status broadcast is in progress (a status
//! callback calling `stop()`) are queued and delivered after it, so every
//! listener sees transitions in the order they happened.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Connector;

/// Delay between losing a connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Where the connection currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Idle,
    Connecting,
    Connected,
    PendingReconnect,
}

/// Receives what the connection produces.
///
/// Both methods are called synchronously from the connection task, in the
/// order events happen, and never after [`ConnectionManager::stop`] returned.
pub trait ConnectionEvents: Send + Sync {
    /// The connection went up (`true`) or down (`false`).
    fn on_status(&self, connected: bool);

    /// A frame was received and parsed as JSON.
    fn on_frame(&self, frame: &Value);
}

struct Session {
    id: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    phase: ConnectionPhase,
    connected: bool,
    session: Option<Session>,
    next_id: u64,
}

impl State {
    fn is_current(&self, id: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == id)
    }
}

/// Status changes waiting for delivery. Only touched under the delivery lock.
#[derive(Default)]
struct StatusQueue {
    pending: VecDeque<bool>,
    draining: bool,
    /// The status most recently handed to [`ConnectionEvents::on_status`].
    delivered: bool,
}

struct Shared {
    connector: Arc<dyn Connector>,
    reconnect_delay: Duration,
    events: Arc<dyn ConnectionEvents>,
    state: Mutex<State>,
    delivery: ReentrantMutex<RefCell<StatusQueue>>,
}

impl Shared {
    fn endpoint(&self) -> &str {
        self.connector.description()
    }

    fn set_phase(&self, id: u64, phase: ConnectionPhase) -> bool {
        let mut state = self.state.lock();
        if !state.is_current(id) {
            return false;
        }
        state.phase = phase;
        true
    }

    /// Queue `connected` for delivery and drain the queue unless an outer
    /// call on this thread is already draining it.
    fn emit_status(&self, queue: &RefCell<StatusQueue>, connected: bool) {
        {
            let mut queue = queue.borrow_mut();
            queue.pending.push_back(connected);
            if queue.draining {
                return;
            }
            queue.draining = true;
        }

        loop {
            let next = {
                let mut queue = queue.borrow_mut();
                let next = queue.pending.pop_front();
                match next {
                    Some(status) => queue.delivered = status,
                    None => queue.draining = false,
                }
                next
            };
            let Some(status) = next else {
                break;
            };
            self.events.on_status(status);
        }
    }

    /// Record a status change and broadcast it if the status flipped.
    ///
    /// Returns whether the session is still current afterwards.
    fn transition(&self, id: u64, connected: bool) -> bool {
        let delivery = self.delivery.lock();

        let changed = {
            let mut state = self.state.lock();
            if !state.is_current(id) {
                return false;
            }
            state.phase = if connected {
                ConnectionPhase::Connected
            } else {
                ConnectionPhase::PendingReconnect
            };
            std::mem::replace(&mut state.connected, connected) != connected
        };

        if changed {
            self.emit_status(&delivery, connected);
        }
        self.state.lock().is_current(id)
    }

    fn deliver(&self, id: u64, frame: &Value) -> bool {
        let _delivery = self.delivery.lock();

        if !self.state.lock().is_current(id) {
            return false;
        }
        self.events.on_frame(frame);
        self.state.lock().is_current(id)
    }
}

async fn run(shared: Arc<Shared>, id: u64) {
    loop {
        if !shared.set_phase(id, ConnectionPhase::Connecting) {
            return;
        }
        debug!("Connecting to {}", shared.endpoint());

        match shared.connector.connect().await {
            Ok(mut frames) => {
                if !shared.transition(id, true) {
                    return;
                }
                info!("Connected to {}", shared.endpoint());

                let reason = loop {
                    match frames.next().await {
                        Some(Ok(text)) => {
                            let frame = match serde_json::from_str::<Value>(&text) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    warn!("Dropping malformed frame from {}: {}", shared.endpoint(), e);
                                    continue;
                                }
                            };
                            if !shared.deliver(id, &frame) {
                                return;
                            }
                        }
                        Some(Err(e)) => break e.to_string(),
                        None => break "closed by peer".to_string(),
                    }
                };

                warn!("Connection to {} lost: {}", shared.endpoint(), reason);
                if !shared.transition(id, false) {
                    return;
                }
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", shared.endpoint(), e);
            }
        }

        if !shared.set_phase(id, ConnectionPhase::PendingReconnect) {
            return;
        }
        debug!(
            "Reconnecting to {} in {:?}",
            shared.endpoint(),
            shared.reconnect_delay
        );
        tokio::time::sleep(shared.reconnect_delay).await;
    }
}

/// Keeps one streaming connection alive.
///
/// Reconnects forever with a fixed delay until stopped. Dropping the manager
/// stops it.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        events: Arc<dyn ConnectionEvents>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                reconnect_delay,
                events,
                state: Mutex::new(State::default()),
                delivery: ReentrantMutex::new(RefCell::new(StatusQueue::default())),
            }),
        }
    }

    /// Start connecting. Does nothing if a session is already running.
    ///
    /// Must be called from within a tokio runtime; outside one the call is
    /// logged and ignored.
    pub fn start(&self) {
        let mut state = self.shared.state.lock();
        if state.session.is_some() {
            debug!("Connection to {} already running", self.shared.endpoint());
            return;
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!("Cannot start connection to {}: {}", self.shared.endpoint(), e);
                return;
            }
        };

        state.next_id += 1;
        let id = state.next_id;
        state.phase = ConnectionPhase::Connecting;

        let task = handle.spawn(run(Arc::clone(&self.shared), id));
        state.session = Some(Session { id, task });
    }

    /// Stop the connection and cancel any pending reconnect.
    ///
    /// If the connection was up, `false` is broadcast before this returns.
    /// Called from inside a status callback, the `false` follows once the
    /// status being delivered has reached every listener.
    /// Safe to call repeatedly and from inside an event callback.
    pub fn stop(&self) {
        let delivery = self.shared.delivery.lock();

        let (session, was_connected) = {
            let mut state = self.shared.state.lock();
            state.phase = ConnectionPhase::Idle;
            let was_connected = std::mem::replace(&mut state.connected, false);
            (state.session.take(), was_connected)
        };

        let Some(session) = session else {
            return;
        };
        session.task.abort();
        info!("Stopped connection to {}", self.shared.endpoint());

        if was_connected {
            self.shared.emit_status(&delivery, false);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.shared.state.lock().phase
    }

    pub fn endpoint(&self) -> &str {
        self.shared.endpoint()
    }

    /// Run `f` with the current status while no transition can be delivered.
    ///
    /// Lets a new status listener be registered and primed without missing
    /// or duplicating a concurrent transition.
    ///
    /// Inside a status callback this is the status being delivered; anything
    /// still queued behind it reaches the new listener afterwards.
    pub fn with_status<R>(&self, f: impl FnOnce(bool) -> R) -> R {
        let delivery = self.shared.delivery.lock();
        let connected = delivery.borrow().delivered;
        f(connected)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint())
            .field("phase", &self.phase())
            .finish()
    }
}
