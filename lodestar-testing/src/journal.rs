// Shared event journal

use parking_lot::Mutex;
use std::sync::Arc;

/// Ordered log of events shared between test doubles, so a test can check
/// the relative order of lock and callback activity.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    /// All events so far
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Number of events equal to `event`
    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    /// Position of the first occurrence of `event`
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.lock().iter().position(|e| e == event)
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
