//! Distributed lock contract

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Interval between acquisition polls while waiting for a held lock.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Distributed lock errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to acquire lock: {0}")]
    AcquireFailed(String),

    #[error("Failed to release lock: {0}")]
    ReleaseFailed(String),

    #[error("Failed to renew lock: {0}")]
    RenewFailed(String),

    #[error("Lock acquisition interrupted")]
    Interrupted,

    #[error("Lock timeout")]
    Timeout,

    #[error("Lock not held: {0}")]
    NotHeld(String),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),
}

/// A named, advisory lock handle.
///
/// Mutual exclusion is enforced by the backing store with an expiry; a
/// holder that stops renewing loses the lock once the expiry lapses.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Name the lock was obtained under
    fn name(&self) -> &str;

    /// Try to acquire the lock, waiting at most `wait`.
    ///
    /// Returns `Ok(false)` when the lock is still held elsewhere once the
    /// wait elapses, and [`LockError::Interrupted`] when the wait was
    /// cancelled.
    async fn try_acquire(&self, wait: Duration) -> Result<bool, LockError>;

    /// Release the lock. Releasing a lock that is not held is a no-op.
    async fn release(&self) -> Result<(), LockError>;
}

/// Source of lock handles and renewal for one replica.
#[async_trait]
pub trait LockRegistry: Send + Sync {
    /// Obtain the handle for `name`. The same registry hands out the same
    /// handle for the same name.
    fn obtain(&self, name: &str) -> Result<Arc<dyn DistributedLock>, LockError>;

    /// Extend the expiry of the lock held under `name` to `ttl` from now.
    ///
    /// Fails with [`LockError::NotHeld`] when this registry no longer holds it.
    async fn renew(&self, name: &str, ttl: Duration) -> Result<(), LockError>;
}

/// Time left until `deadline`, capped at the poll interval.
pub(crate) fn next_poll(deadline: tokio::time::Instant) -> Option<Duration> {
    let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
    if remaining.is_zero() {
        None
    } else {
        Some(remaining.min(POLL_INTERVAL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_next_poll_caps_at_interval() {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        assert_eq!(next_poll(deadline), Some(POLL_INTERVAL));

        let deadline = tokio::time::Instant::now() + Duration::from_millis(30);
        assert_eq!(next_poll(deadline), Some(Duration::from_millis(30)));

        let deadline = tokio::time::Instant::now();
        assert_eq!(next_poll(deadline), None);
    }

    #[test]
    fn test_error_display() {
        let err = LockError::NotHeld("leader".to_string());
        assert_eq!(err.to_string(), "Lock not held: leader");
    }
}
