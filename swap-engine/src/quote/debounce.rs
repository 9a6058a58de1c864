//! Debouncing for quote requests driven by user input
//!
//! Each input change starts a new generation; a scheduled fetch only
//! proceeds if its generation is still current once the quiescence
//! window elapses. Superseded generations resolve to a no-op rather
//! than being aborted mid-flight.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::time::sleep;

/// The default quiescence window before a quote request fires
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// A generation-counter debouncer for quote requests
#[derive(Clone)]
pub struct QuoteDebouncer {
    /// The current input generation
    generation: Arc<AtomicU64>,
    /// The quiescence window
    window: Duration,
}

impl Default for QuoteDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}

impl QuoteDebouncer {
    /// Create a debouncer with the given quiescence window
    pub fn new(window: Duration) -> Self {
        Self { generation: Arc::new(AtomicU64::new(0)), window }
    }

    /// Register an input change and wait out the quiescence window
    ///
    /// Returns `true` if no newer input arrived while waiting, i.e. the
    /// caller holds the latest generation and should fetch a quote.
    pub async fn settle(&self) -> bool {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        sleep(self.window).await;

        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Invalidate any pending generation without scheduling a new fetch,
    /// e.g. on form reset or component teardown
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
