use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;

/// Observable load status of one cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadingState {
    pub is_loading: bool,
    pub error: Option<String>,
    /// Set after the first successful load and never cleared
    pub initialized: bool,
}

/// Owns a cache's [`LoadingState`] and publishes every change to subscribers.
///
/// Overlapping attempts are counted; `is_loading` drops only when the last one finishes.
#[derive(Debug)]
pub struct LoadingTracker {
    tx: watch::Sender<LoadingState>,
    in_flight: AtomicUsize,
}

impl Default for LoadingTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadingTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LoadingState::default());
        Self {
            tx,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadingState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> LoadingState {
        self.tx.borrow().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.tx.borrow().initialized
    }

    /// A new attempt clears the previous error.
    pub fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.tx.send_modify(|state| {
            state.is_loading = true;
            state.error = None;
        });
    }

    /// Count one attempt as finished and return whether others are still running.
    fn finish(&self) -> bool {
        let previous = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
            .unwrap_or_default();
        previous > 1
    }

    pub fn succeed(&self) {
        let still_loading = self.finish();
        self.tx.send_modify(|state| {
            state.is_loading = still_loading;
            state.initialized = true;
        });
    }

    pub fn fail(&self, error: impl ToString) {
        let message = error.to_string();
        let still_loading = self.finish();
        self.tx.send_modify(|state| {
            state.is_loading = still_loading;
            state.error = Some(message);
        });
    }
}
