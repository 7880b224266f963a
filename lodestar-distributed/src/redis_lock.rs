//! Distributed locks using Redis

use crate::lock::{DistributedLock, LockError, LockRegistry, next_poll};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Take the lock when free, or extend it when we already hold it.
const ACQUIRE_SCRIPT: &str = r#"
    local current = redis.call("get", KEYS[1])
    if current == ARGV[1] then
        redis.call("pexpire", KEYS[1], ARGV[2])
        return 1
    elseif current == false then
        redis.call("set", KEYS[1], ARGV[1], "PX", ARGV[2])
        return 1
    else
        return 0
    end
"#;

const RELEASE_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

const RENEW_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("pexpire", KEYS[1], ARGV[2])
    else
        return 0
    end
"#;

fn lock_key(registry_key: &str, name: &str) -> String {
    format!("{}:{}", registry_key, name)
}

/// Redis-backed lock handle.
///
/// Holds a random token; only the handle whose token is stored under the key
/// can extend or delete it.
pub struct RedisLock {
    name: String,
    key: String,
    token: String,
    ttl: Duration,
    conn: redis::aio::ConnectionManager,
}

impl RedisLock {
    fn new(name: &str, key: String, ttl: Duration, conn: redis::aio::ConnectionManager) -> Self {
        Self {
            name: name.to_string(),
            key,
            token: Uuid::new_v4().to_string(),
            ttl,
            conn,
        }
    }

    /// Get the Redis key backing this lock
    pub fn key(&self) -> &str {
        &self.key
    }

    async fn try_set(&self) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let result: i32 = redis::Script::new(ACQUIRE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .arg(px_millis(self.ttl))
            .invoke_async(&mut conn)
            .await?;

        Ok(result == 1)
    }

    async fn renew(&self, ttl: Duration) -> Result<(), LockError> {
        let mut conn = self.conn.clone();
        let result: i32 = redis::Script::new(RENEW_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .arg(px_millis(ttl))
            .invoke_async(&mut conn)
            .await?;

        if result == 1 {
            Ok(())
        } else {
            Err(LockError::NotHeld(self.name.clone()))
        }
    }
}

#[async_trait]
impl DistributedLock for RedisLock {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_acquire(&self, wait: Duration) -> Result<bool, LockError> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            if self.try_set().await? {
                info!("Acquired lock: {}", self.key);
                return Ok(true);
            }

            match next_poll(deadline) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    debug!("Failed to acquire lock (already held): {}", self.key);
                    return Ok(false);
                }
            }
        }
    }

    async fn release(&self) -> Result<(), LockError> {
        let mut conn = self.conn.clone();
        let result: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await?;

        if result == 1 {
            debug!("Released lock: {}", self.key);
        } else {
            debug!("Lock already released or expired: {}", self.key);
        }
        Ok(())
    }
}

/// Registry of Redis locks for one replica.
///
/// Keys live under `<registry_key>:<lock name>` and expire after
/// `expire_after` unless renewed.
pub struct RedisLockRegistry {
    registry_key: String,
    expire_after: Duration,
    conn: redis::aio::ConnectionManager,
    locks: Mutex<HashMap<String, Arc<RedisLock>>>,
}

impl RedisLockRegistry {
    /// Create new Redis lock registry
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use lodestar_distributed::RedisLockRegistry;
    /// use std::time::Duration;
    ///
    /// let client = redis::Client::open("redis://127.0.0.1/")?;
    /// let conn = client.get_connection_manager().await?;
    /// let registry = RedisLockRegistry::new("orders-lock-registry", Duration::from_secs(120), conn);
    /// ```
    pub fn new(
        registry_key: impl Into<String>,
        expire_after: Duration,
        conn: redis::aio::ConnectionManager,
    ) -> Self {
        Self {
            registry_key: registry_key.into(),
            expire_after,
            conn,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Registry keyed after the lock it will mostly serve
    /// (`<lock_name>-lock-registry`).
    pub fn for_lock(lock_name: &str, expire_after: Duration, conn: redis::aio::ConnectionManager) -> Self {
        Self::new(format!("{}-lock-registry", lock_name), expire_after, conn)
    }

    /// Get the registry key prefix
    pub fn registry_key(&self) -> &str {
        &self.registry_key
    }

    fn cached(&self, name: &str) -> Option<Arc<RedisLock>> {
        self.locks.lock().get(name).cloned()
    }
}

#[async_trait]
impl LockRegistry for RedisLockRegistry {
    fn obtain(&self, name: &str) -> Result<Arc<dyn DistributedLock>, LockError> {
        if name.is_empty() {
            return Err(LockError::AcquireFailed("lock name cannot be empty".to_string()));
        }

        let mut locks = self.locks.lock();
        let lock = locks
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(RedisLock::new(
                    name,
                    lock_key(&self.registry_key, name),
                    self.expire_after,
                    self.conn.clone(),
                ))
            })
            .clone();

        Ok(lock)
    }

    async fn renew(&self, name: &str, ttl: Duration) -> Result<(), LockError> {
        let Some(lock) = self.cached(name) else {
            warn!("Renew requested for unknown lock: {}", name);
            return Err(LockError::NotHeld(name.to_string()));
        };

        lock.renew(ttl).await
    }
}

/// Expiry argument for `PX`/`PEXPIRE`: saturates instead of wrapping and
/// never drops to zero, which Redis rejects.
fn px_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_px_millis_saturates() {
        assert_eq!(px_millis(Duration::from_secs(120)), 120_000);
        assert_eq!(px_millis(Duration::from_micros(300)), 1);
        assert_eq!(px_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_lock_key_layout() {
        assert_eq!(lock_key("orders-lock-registry", "orders"), "orders-lock-registry:orders");
    }

    #[test]
    fn test_release_and_renew_compare_tokens() {
        assert!(RELEASE_SCRIPT.contains("== ARGV[1]"));
        assert!(RENEW_SCRIPT.contains("== ARGV[1]"));
    }
}
