//! In-memory distributed locks (for testing/development)

use crate::lock::{DistributedLock, LockError, LockRegistry, next_poll};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Holder {
    token: String,
    expires_at: Instant,
}

/// Shared lock table standing in for a coordination service.
///
/// Clones share the same table, so one store can back several
/// [`InMemoryLockRegistry`] instances acting as separate replicas.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockStore {
    holders: Arc<Mutex<HashMap<String, Holder>>>,
}

impl InMemoryLockStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Token of the current, unexpired holder of `name`
    pub fn holder(&self, name: &str) -> Option<String> {
        let now = Instant::now();
        self.holders
            .lock()
            .get(name)
            .filter(|holder| holder.expires_at > now)
            .map(|holder| holder.token.clone())
    }

    /// Whether `name` is currently held by anyone
    pub fn is_locked(&self, name: &str) -> bool {
        self.holder(name).is_some()
    }

    /// Drop the entry for `name` as if its expiry had lapsed.
    pub fn expire(&self, name: &str) {
        self.holders.lock().remove(name);
    }

    fn try_take(&self, name: &str, token: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut holders = self.holders.lock();

        match holders.get_mut(name) {
            Some(holder) if holder.token == token || holder.expires_at <= now => {
                holder.token = token.to_string();
                holder.expires_at = now + ttl;
                true
            }
            Some(_) => false,
            None => {
                holders.insert(
                    name.to_string(),
                    Holder {
                        token: token.to_string(),
                        expires_at: now + ttl,
                    },
                );
                true
            }
        }
    }

    fn extend(&self, name: &str, token: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.holders.lock().get_mut(name) {
            Some(holder) if holder.token == token && holder.expires_at > now => {
                holder.expires_at = now + ttl;
                true
            }
            _ => false,
        }
    }

    fn remove_if_owner(&self, name: &str, token: &str) -> bool {
        let mut holders = self.holders.lock();
        if holders.get(name).is_some_and(|holder| holder.token == token) {
            holders.remove(name);
            true
        } else {
            false
        }
    }
}

/// In-memory lock handle
pub struct InMemoryLock {
    name: String,
    token: String,
    ttl: Duration,
    store: InMemoryLockStore,
}

impl InMemoryLock {
    /// Token identifying this handle in the store
    pub fn token(&self) -> &str {
        &self.token
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_acquire(&self, wait: Duration) -> Result<bool, LockError> {
        let deadline = Instant::now() + wait;

        loop {
            if self.store.try_take(&self.name, &self.token, self.ttl) {
                debug!("Acquired in-memory lock: {}", self.name);
                return Ok(true);
            }

            match next_poll(deadline) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Ok(false),
            }
        }
    }

    async fn release(&self) -> Result<(), LockError> {
        if self.store.remove_if_owner(&self.name, &self.token) {
            debug!("Released in-memory lock: {}", self.name);
        }
        Ok(())
    }
}

/// Per-replica registry over a shared [`InMemoryLockStore`]
pub struct InMemoryLockRegistry {
    store: InMemoryLockStore,
    expire_after: Duration,
    locks: Mutex<HashMap<String, Arc<InMemoryLock>>>,
}

impl InMemoryLockRegistry {
    /// Create a registry whose locks expire after `expire_after` unless renewed
    pub fn new(store: InMemoryLockStore, expire_after: Duration) -> Self {
        Self {
            store,
            expire_after,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The shared store behind this registry
    pub fn store(&self) -> &InMemoryLockStore {
        &self.store
    }

    /// Whether this registry's handle for `name` is the current holder
    pub fn holds(&self, name: &str) -> bool {
        let token = self.locks.lock().get(name).map(|lock| lock.token.clone());
        token.is_some_and(|token| self.store.holder(name).as_deref() == Some(token.as_str()))
    }
}

#[async_trait]
impl LockRegistry for InMemoryLockRegistry {
    fn obtain(&self, name: &str) -> Result<Arc<dyn DistributedLock>, LockError> {
        if name.is_empty() {
            return Err(LockError::AcquireFailed("lock name cannot be empty".to_string()));
        }

        let lock = self
            .locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(InMemoryLock {
                    name: name.to_string(),
                    token: Uuid::new_v4().to_string(),
                    ttl: self.expire_after,
                    store: self.store.clone(),
                })
            })
            .clone();

        Ok(lock)
    }

    async fn renew(&self, name: &str, ttl: Duration) -> Result<(), LockError> {
        let token = self.locks.lock().get(name).map(|lock| lock.token.clone());

        match token {
            Some(token) if self.store.extend(name, &token, ttl) => Ok(()),
            _ => Err(LockError::NotHeld(name.to_string())),
        }
    }
}
