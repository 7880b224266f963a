// Scripted lock registry

use crate::journal::Journal;
use async_trait::async_trait;
use lodestar_distributed::{DistributedLock, LockError, LockRegistry};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What a scripted `try_acquire` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// `Ok(true)`
    Acquired,
    /// `Ok(false)`, as if held elsewhere until the wait elapsed
    Busy,
    /// `Err(LockError::Interrupted)`
    Interrupted,
    /// `Err(LockError::AcquireFailed)`, as if the store were unreachable
    Unavailable,
}

#[derive(Default)]
struct Script {
    acquire: VecDeque<AcquireOutcome>,
    renew: VecDeque<bool>,
}

#[derive(Default)]
struct Counters {
    obtains: AtomicUsize,
    acquires: AtomicUsize,
    renewals: AtomicUsize,
    releases: AtomicUsize,
}

struct Shared {
    script: Mutex<Script>,
    default_acquire: Mutex<AcquireOutcome>,
    default_renew: Mutex<bool>,
    fail_release: Mutex<bool>,
    counters: Counters,
    journal: Journal,
}

/// Lock registry whose outcomes are scripted by the test.
///
/// Queued outcomes are consumed first; once the queue is empty the default
/// applies (`Acquired` for acquisition, success for renewal).
#[derive(Clone)]
pub struct ScriptedLockRegistry {
    shared: Arc<Shared>,
}

impl ScriptedLockRegistry {
    pub fn new() -> Self {
        Self::with_journal(Journal::new())
    }

    /// Record `acquire`, `renew` and `release` events into `journal`
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            shared: Arc::new(Shared {
                script: Mutex::new(Script::default()),
                default_acquire: Mutex::new(AcquireOutcome::Acquired),
                default_renew: Mutex::new(true),
                fail_release: Mutex::new(false),
                counters: Counters::default(),
                journal,
            }),
        }
    }

    /// Queue acquisition outcomes
    pub fn script_acquire(&self, outcomes: impl IntoIterator<Item = AcquireOutcome>) -> &Self {
        self.shared.script.lock().acquire.extend(outcomes);
        self
    }

    /// Outcome once the acquisition queue is empty
    pub fn set_default_acquire(&self, outcome: AcquireOutcome) -> &Self {
        *self.shared.default_acquire.lock() = outcome;
        self
    }

    /// Queue renewal outcomes (`true` succeeds)
    pub fn script_renew(&self, outcomes: impl IntoIterator<Item = bool>) -> &Self {
        self.shared.script.lock().renew.extend(outcomes);
        self
    }

    /// Make the next renewal fail
    pub fn fail_next_renewal(&self) -> &Self {
        self.script_renew([false])
    }

    /// Renewal result once the renewal queue is empty
    pub fn set_default_renew(&self, succeeds: bool) -> &Self {
        *self.shared.default_renew.lock() = succeeds;
        self
    }

    /// Make releases return an error
    pub fn fail_releases(&self, fail: bool) -> &Self {
        *self.shared.fail_release.lock() = fail;
        self
    }

    pub fn obtains(&self) -> usize {
        self.shared.counters.obtains.load(Ordering::SeqCst)
    }

    pub fn acquire_attempts(&self) -> usize {
        self.shared.counters.acquires.load(Ordering::SeqCst)
    }

    pub fn renewals(&self) -> usize {
        self.shared.counters.renewals.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.shared.counters.releases.load(Ordering::SeqCst)
    }

    pub fn journal(&self) -> &Journal {
        &self.shared.journal
    }
}

impl Default for ScriptedLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct ScriptedLock {
    name: String,
    shared: Arc<Shared>,
}

#[async_trait]
impl DistributedLock for ScriptedLock {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_acquire(&self, _wait: Duration) -> Result<bool, LockError> {
        self.shared.counters.acquires.fetch_add(1, Ordering::SeqCst);
        self.shared.journal.record("acquire");

        let outcome = self
            .shared
            .script
            .lock()
            .acquire
            .pop_front()
            .unwrap_or_else(|| *self.shared.default_acquire.lock());

        match outcome {
            AcquireOutcome::Acquired => Ok(true),
            AcquireOutcome::Busy => Ok(false),
            AcquireOutcome::Interrupted => Err(LockError::Interrupted),
            AcquireOutcome::Unavailable => Err(LockError::AcquireFailed("store unreachable".to_string())),
        }
    }

    async fn release(&self) -> Result<(), LockError> {
        self.shared.counters.releases.fetch_add(1, Ordering::SeqCst);
        self.shared.journal.record("release");

        if *self.shared.fail_release.lock() {
            return Err(LockError::ReleaseFailed(self.name.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl LockRegistry for ScriptedLockRegistry {
    fn obtain(&self, name: &str) -> Result<Arc<dyn DistributedLock>, LockError> {
        self.shared.counters.obtains.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedLock {
            name: name.to_string(),
            shared: self.shared.clone(),
        }))
    }

    async fn renew(&self, name: &str, _ttl: Duration) -> Result<(), LockError> {
        self.shared.counters.renewals.fetch_add(1, Ordering::SeqCst);
        self.shared.journal.record("renew");

        let succeeds = self
            .shared
            .script
            .lock()
            .renew
            .pop_front()
            .unwrap_or_else(|| *self.shared.default_renew.lock());

        if succeeds {
            Ok(())
        } else {
            Err(LockError::NotHeld(name.to_string()))
        }
    }
}
