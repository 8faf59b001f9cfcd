//! Visibility of the surface that consumes market data
//!
//! Polling only hits the network while the consumer is visible. A dashboard
//! host flips the state when its window is hidden or shown; headless callers
//! can leave it visible.

use tokio::sync::watch;

/// Source of the current visibility state and its transitions
pub trait VisibilitySource: Send + Sync {
    /// Whether the consumer is currently visible
    fn is_visible(&self) -> bool;

    /// A receiver that observes every subsequent change
    fn watch(&self) -> watch::Receiver<bool>;
}

/// Visibility state shared between the host and the poller
#[derive(Debug)]
pub struct Visibility {
    tx: watch::Sender<bool>,
}

impl Visibility {
    /// Creates a visibility state with the given initial value
    pub fn new(visible: bool) -> Self {
        let (tx, _rx) = watch::channel(visible);
        Self { tx }
    }

    /// A state that starts visible
    pub fn visible() -> Self {
        Self::new(true)
    }

    /// Updates the state. Watchers are woken only when the value changes.
    pub fn set_visible(&self, visible: bool) {
        self.tx.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::visible()
    }
}

impl VisibilitySource for Visibility {
    fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
