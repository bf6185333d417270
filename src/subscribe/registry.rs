//! Subscriber sets with isolated, snapshot-based delivery.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error};

type MessageFn = dyn Fn(&Value) + Send + Sync;
type StatusFn = dyn Fn(bool) + Send + Sync;

/// Callback receiving every raw frame.
pub type MessageCallback = Arc<MessageFn>;

/// Callback receiving connection status transitions.
pub type StatusCallback = Arc<StatusFn>;

struct Entry<F: ?Sized> {
    id: u64,
    callback: Arc<F>,
    /// Live [`Subscription`] handles for this callback.
    handles: usize,
}

struct Listeners<F: ?Sized> {
    kind: &'static str,
    entries: Mutex<Vec<Entry<F>>>,
    next_id: AtomicU64,
}

fn same_callback<F: ?Sized>(a: &Arc<F>, b: &Arc<F>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl<F: ?Sized> Listeners<F> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add `callback`, or take another handle on it if already present.
    fn add(&self, callback: Arc<F>) -> u64 {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|e| same_callback(&e.callback, &callback)) {
            entry.handles += 1;
            return entry.id;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.push(Entry {
            id,
            callback,
            handles: 1,
        });
        debug!("Added {} subscriber {} ({} total)", self.kind, id, entries.len());
        id
    }

    fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries
            .lock()
            .iter()
            .map(|e| Arc::clone(&e.callback))
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Call `deliver` for each subscriber, isolating panics.
    fn broadcast(&self, deliver: impl Fn(&F)) {
        for callback in self.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| deliver(&*callback))).is_err() {
                error!("A {} subscriber panicked; delivery continues", self.kind);
            }
        }
    }
}

trait Unregister: Send + Sync {
    fn unregister(&self, id: u64);
}

impl<F: ?Sized + Send + Sync> Unregister for Listeners<F> {
    fn unregister(&self, id: u64) {
        let mut entries = self.entries.lock();
        let Some(index) = entries.iter().position(|e| e.id == id) else {
            return;
        };
        entries[index].handles -= 1;
        if entries[index].handles == 0 {
            entries.remove(index);
            debug!("Removed {} subscriber {} ({} left)", self.kind, id, entries.len());
        }
    }
}

/// Handle to a registered callback.
///
/// The callback stays registered until the handle is dropped or
/// [`unsubscribe`](Subscription::unsubscribe)d. Registering the same `Arc`
/// twice yields one delivery per event, and it stays registered until both
/// handles are released.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    listeners: Weak<dyn Unregister>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.unregister(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// The message and status subscriber sets.
///
/// Broadcasts iterate over a snapshot of the set, so callbacks may subscribe
/// or unsubscribe while being called. A panicking callback is logged and the
/// remaining subscribers still get the event.
pub struct SubscriptionRegistry {
    messages: Arc<Listeners<MessageFn>>,
    status: Arc<Listeners<StatusFn>>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(Listeners::new("message")),
            status: Arc::new(Listeners::new("status")),
        }
    }

    pub fn subscribe_messages(&self, callback: MessageCallback) -> Subscription {
        let id = self.messages.add(callback);
        let listeners = Arc::downgrade(&self.messages) as Weak<dyn Unregister>;
        Subscription { id, listeners }
    }

    /// Register a status callback and call it once with `current`.
    pub fn subscribe_status(&self, callback: StatusCallback, current: bool) -> Subscription {
        let id = self.status.add(Arc::clone(&callback));
        let listeners = Arc::downgrade(&self.status) as Weak<dyn Unregister>;
        let subscription = Subscription { id, listeners };

        if catch_unwind(AssertUnwindSafe(|| callback(current))).is_err() {
            error!("A status subscriber panicked on its initial status");
        }
        subscription
    }

    pub fn broadcast_message(&self, frame: &Value) {
        self.messages.broadcast(|callback| callback(frame));
    }

    pub fn broadcast_status(&self, connected: bool) {
        self.status.broadcast(|callback| callback(connected));
    }

    pub fn message_subscriber_count(&self) -> usize {
        self.messages.len()
    }

    pub fn status_subscriber_count(&self) -> usize {
        self.status.len()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("messages", &self.message_subscriber_count())
            .field("status", &self.status_subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counting_message() -> (MessageCallback, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: MessageCallback = Arc::new(move |frame: &Value| sink.lock().push(frame.clone()));
        (callback, seen)
    }

    #[test]
    fn test_duplicate_registration_delivers_once() {
        let registry = SubscriptionRegistry::new();
        let (callback, seen) = counting_message();

        let first = registry.subscribe_messages(callback.clone());
        let second = registry.subscribe_messages(callback.clone());
        assert_eq!(registry.message_subscriber_count(), 1);

        registry.broadcast_message(&json!({"mean": 1.0}));
        assert_eq!(seen.lock().len(), 1);

        drop(first);
        assert_eq!(registry.message_subscriber_count(), 1);
        registry.broadcast_message(&json!({"mean": 2.0}));
        assert_eq!(seen.lock().len(), 2);

        second.unsubscribe();
        assert_eq!(registry.message_subscriber_count(), 0);
        registry.broadcast_message(&json!({"mean": 3.0}));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_delivery_in_insertion_order() {
        let registry = SubscriptionRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let _subs: Vec<Subscription> = (0..3)
            .map(|n| {
                let order = order.clone();
                let callback: StatusCallback = Arc::new(move |_: bool| order.lock().push(n));
                registry.subscribe_status(callback, false)
            })
            .collect();
        order.lock().clear();

        registry.broadcast_status(true);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let registry = SubscriptionRegistry::new();
        let bad: MessageCallback = Arc::new(|_: &Value| panic!("consumer bug"));
        let (good, seen) = counting_message();

        let _bad = registry.subscribe_messages(bad);
        let _good = registry.subscribe_messages(good);

        registry.broadcast_message(&json!({"mean": 1.0}));
        registry.broadcast_message(&json!({"mean": 2.0}));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_status_subscriber_gets_current_value() {
        let registry = SubscriptionRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: StatusCallback = Arc::new(move |connected: bool| sink.lock().push(connected));

        let _sub = registry.subscribe_status(callback, true);
        assert_eq!(*seen.lock(), vec![true]);

        registry.broadcast_status(false);
        assert_eq!(*seen.lock(), vec![true, false]);
    }

    #[test]
    fn test_status_subscription_unregisters_on_drop() {
        let registry = SubscriptionRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: StatusCallback = Arc::new(move |connected: bool| sink.lock().push(connected));

        let sub = registry.subscribe_status(callback, false);
        assert_eq!(registry.status_subscriber_count(), 1);

        drop(sub);
        assert_eq!(registry.status_subscriber_count(), 0);
        registry.broadcast_status(true);
        assert_eq!(*seen.lock(), vec![false]);
    }

    #[test]
    fn test_unsubscribe_during_broadcast() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let held: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let (other, seen) = counting_message();

        let slot = held.clone();
        let self_removing: MessageCallback = Arc::new(move |_: &Value| {
            slot.lock().take();
        });
        *held.lock() = Some(registry.subscribe_messages(self_removing));
        let _other = registry.subscribe_messages(other);

        registry.broadcast_message(&json!({"mean": 1.0}));
        assert_eq!(registry.message_subscriber_count(), 1);
        assert_eq!(seen.lock().len(), 1);

        registry.broadcast_message(&json!({"mean": 2.0}));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_subscribe_during_broadcast() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let added: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));
        let (late, seen) = counting_message();

        let reg = Arc::downgrade(&registry);
        let added_in = added.clone();
        let adder: MessageCallback = Arc::new(move |_: &Value| {
            if let Some(reg) = reg.upgrade() {
                added_in.lock().push(reg.subscribe_messages(late.clone()));
            }
        });
        let _adder = registry.subscribe_messages(adder);

        registry.broadcast_message(&json!({"mean": 1.0}));
        assert!(seen.lock().is_empty());

        registry.broadcast_message(&json!({"mean": 2.0}));
        assert_eq!(seen.lock().len(), 1);
        added.lock().clear();
    }

    #[test]
    fn test_handle_outliving_registry() {
        let registry = SubscriptionRegistry::new();
        let (callback, _seen) = counting_message();
        let sub = registry.subscribe_messages(callback);
        drop(registry);
        drop(sub);
    }
}
