//! Cancellable handles for scheduled tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct HandleState {
    cancelled: AtomicBool,
    done: AtomicBool,
    cancel_requests: AtomicUsize,
    notify: Notify,
}

/// Handle to a task submitted to a [`Scheduler`](crate::Scheduler).
///
/// Cancellation is cooperative: a task that is already executing runs to
/// completion, but it will not be started again. Cancelling is idempotent and
/// clones of a handle share the same state.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    inner: Arc<HandleState>,
}

impl TaskHandle {
    /// Create a fresh, active handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle that is already cancelled.
    pub fn cancelled_handle() -> Self {
        let handle = Self::new();
        handle.inner.cancelled.store(true, Ordering::Release);
        handle
    }

    /// Cancel the task.
    ///
    /// Returns `true` only for the call that actually transitioned the handle
    /// into the cancelled state.
    pub fn cancel(&self) -> bool {
        self.inner.cancel_requests.fetch_add(1, Ordering::AcqRel);
        let first = !self.inner.cancelled.swap(true, Ordering::AcqRel);
        if first {
            self.inner.notify.notify_one();
        }
        first
    }

    /// Whether the task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Whether a one-shot task has finished running.
    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }

    /// Neither cancelled nor finished.
    pub fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.is_done()
    }

    /// Number of times [`cancel`](Self::cancel) was called on this handle or
    /// any of its clones.
    pub fn cancel_requests(&self) -> usize {
        self.inner.cancel_requests.load(Ordering::Acquire)
    }

    /// Mark a one-shot task as finished. Called by scheduler implementations.
    pub fn mark_done(&self) {
        self.inner.done.store(true, Ordering::Release);
    }

    /// Resolve once the handle is cancelled.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.inner.notify.notified().await;
        }
    }
}
