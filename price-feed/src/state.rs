//! The shared state of the price feed and its subscriber registry
//!
//! The state is owned by the [`PriceFeedClient`](crate::PriceFeedClient)
//! and mutated exclusively by its internal connection task; subscribers
//! only ever read from it.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
    time::SystemTime,
};

use atomic_float::AtomicF64;

// ---------
// | Types |
// ---------

/// The observable connection state of the price feed
///
/// Transitions:
/// `Connecting(i) -> Live` on a successful stream open,
/// `Live -> Reconnecting` on stream close or error,
/// `Reconnecting -> Connecting((i + 1) % N)` after the reconnect delay,
/// and `Reconnecting -> Polling` once the attempt bound is exhausted.
/// A manual refetch returns the machine to `Connecting(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// Dialing the stream endpoint at the given index
    Connecting(usize),
    /// A live stream connection is delivering ticks
    Live,
    /// The stream dropped; waiting out the delay before the next attempt
    Reconnecting {
        /// The number of consecutive failed attempts so far
        attempt: usize,
    },
    /// Stream attempts are exhausted; polling REST providers instead
    Polling,
}

/// A snapshot of the feed delivered to subscribers on every update
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    /// The current reference price, if one has been received
    pub price: Option<f64>,
    /// The wall-clock time of the last accepted update
    pub last_update: Option<SystemTime>,
    /// Whether a live stream connection is currently established
    pub is_connected: bool,
    /// The name of the source that produced the current price
    pub source: Option<String>,
}

/// A callback invoked with a [`PriceUpdate`] on every accepted price
pub type PriceListener = Arc<dyn Fn(PriceUpdate) + Send + Sync>;

// ----------------
// | Shared State |
// ----------------

/// The process-wide shared state of the price feed
///
/// The price itself is stored losslessly in an [`AtomicF64`] so that
/// non-reactive callers can take a snapshot without locking.
pub(crate) struct FeedShared {
    /// The latest accepted price; meaningless until `has_price` is set
    price: AtomicF64,
    /// Whether any price has ever been accepted
    has_price: AtomicBool,
    /// Whether a live stream connection is currently established
    connected: AtomicBool,
    /// The wall-clock time of the last accepted update
    last_update: Mutex<Option<SystemTime>>,
    /// The name of the source that produced the current price
    source: Mutex<Option<String>>,
    /// The current connection state, observable for status displays
    state: Mutex<FeedState>,
    /// The registered subscriber callbacks, keyed by subscription id
    listeners: Mutex<HashMap<u64, PriceListener>>,
    /// The next subscription id to hand out
    next_listener_id: AtomicU64,
}

impl FeedShared {
    /// Create a new, empty shared state
    pub fn new() -> Self {
        Self {
            price: AtomicF64::new(0.0),
            has_price: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            last_update: Mutex::new(None),
            source: Mutex::new(None),
            state: Mutex::new(FeedState::Connecting(0)),
            listeners: Mutex::new(HashMap::new()),
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// The latest accepted price, or `None` if no price has arrived yet
    pub fn current_price(&self) -> Option<f64> {
        if self.has_price.load(Ordering::Relaxed) {
            Some(self.price.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    /// Whether a live stream connection is currently established
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// The current connection state
    pub fn feed_state(&self) -> FeedState {
        *self.state.lock().expect("feed state lock poisoned")
    }

    /// Take a full snapshot of the feed
    pub fn snapshot(&self) -> PriceUpdate {
        PriceUpdate {
            price: self.current_price(),
            last_update: *self.last_update.lock().expect("last_update lock poisoned"),
            is_connected: self.is_connected(),
            source: self.source.lock().expect("source lock poisoned").clone(),
        }
    }

    /// Record a state machine transition
    pub fn set_state(&self, state: FeedState) {
        *self.state.lock().expect("feed state lock poisoned") = state;
        let connected = matches!(state, FeedState::Live);
        if self.connected.swap(connected, Ordering::Relaxed) != connected {
            // Connectivity changed; let subscribers re-render their status
            self.notify_listeners();
        }
    }

    /// Record an accepted price from the given source and notify
    /// subscribers
    pub fn publish_price(&self, price: f64, source: &str) {
        self.price.store(price, Ordering::Relaxed);
        self.has_price.store(true, Ordering::Relaxed);
        *self.last_update.lock().expect("last_update lock poisoned") = Some(SystemTime::now());

        let mut current_source = self.source.lock().expect("source lock poisoned");
        if current_source.as_deref() != Some(source) {
            *current_source = Some(source.to_string());
        }
        drop(current_source);

        self.notify_listeners();
    }

    /// Invoke every registered listener with the current snapshot
    ///
    /// The callbacks are cloned out of the registry before invocation; a
    /// listener may drop a [`Subscription`], which re-locks the registry
    /// to remove itself.
    fn notify_listeners(&self) {
        let snapshot = self.snapshot();
        let listeners: Vec<PriceListener> =
            self.listeners.lock().expect("listeners lock poisoned").values().cloned().collect();
        for listener in listeners {
            listener(snapshot.clone());
        }
    }

    /// Register a listener, invoking it immediately with the current
    /// snapshot, and return its subscription id
    pub fn add_listener(&self, listener: PriceListener) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        listener(self.snapshot());
        self.listeners.lock().expect("listeners lock poisoned").insert(id, listener);
        id
    }

    /// Remove the listener with the given subscription id
    pub fn remove_listener(&self, id: u64) {
        self.listeners.lock().expect("listeners lock poisoned").remove(&id);
    }
}

// ----------------
// | Subscription |
// ----------------

/// A handle to a registered price listener
///
/// The listener is removed when this handle is dropped or when
/// [`Subscription::unsubscribe`] is called explicitly.
pub struct Subscription {
    /// The id of the registered listener
    id: u64,
    /// The shared state the listener is registered with
    shared: Weak<FeedShared>,
}

impl Subscription {
    /// Create a new subscription handle
    pub(crate) fn new(id: u64, shared: &Arc<FeedShared>) -> Self {
        Self { id, shared: Arc::downgrade(shared) }
    }

    /// Remove the listener from the feed
    pub fn unsubscribe(self) {
        // Removal happens in `Drop`
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove_listener(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A listener that drops another subscription handle mid-update must
    /// not wedge the feed; teardown during a price update is a normal
    /// subscriber pattern
    #[test]
    fn test_unsubscribe_inside_listener() {
        let shared = Arc::new(FeedShared::new());

        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let dropper_id = shared.add_listener(Arc::new(move |_update| {
            slot_clone.lock().unwrap().take();
        }));

        let noop_id = shared.add_listener(Arc::new(|_update| {}));
        *slot.lock().unwrap() = Some(Subscription::new(noop_id, &shared));

        shared.publish_price(2500.0, "test");

        // The dropped handle's listener is gone, the dropping one stays
        let listeners = shared.listeners.lock().unwrap();
        assert!(listeners.contains_key(&dropper_id));
        assert!(!listeners.contains_key(&noop_id));
    }

    /// Dropping a subscription removes its listener from the registry
    #[test]
    fn test_drop_unsubscribes() {
        let shared = Arc::new(FeedShared::new());
        let id = shared.add_listener(Arc::new(|_update| {}));

        drop(Subscription::new(id, &shared));
        assert!(!shared.listeners.lock().unwrap().contains_key(&id));
    }
}
