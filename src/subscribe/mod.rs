//! Consumer subscriptions.
//!
//! Consumers register two kinds of callbacks with the
//! [`TelemetryHub`](crate::TelemetryHub):
//!
//! ```text
//!                        ┌──────────────────────────┐
//!   ConnectionManager ──▶│ SubscriptionRegistry     │──▶ message callbacks (raw frames)
//!     on_frame           │   messages  (set, FIFO)  │
//!     on_status          │   status    (set, FIFO)  │──▶ status callbacks (bool)
//!                        └──────────────────────────┘
//! ```
//!
//! Every registration returns a [`Subscription`] handle; dropping it (or
//! calling [`Subscription::unsubscribe`]) removes the callback. Whether a
//! message subscription also starts the connection is decided by the
//! [`StartPolicy`].

mod policy;
mod registry;

pub use policy::StartPolicy;
pub use registry::{MessageCallback, StatusCallback, Subscription, SubscriptionRegistry};
