//! Leadership lifecycle manager
//!
//! Drives a single replica through acquire, renew, lose and retry against a
//! [`LockRegistry`]. The manager owns no threads: every step is a callable
//! submitted to a [`Scheduler`], and each step checks the run it was
//! scheduled for (`epoch`) and the acquisition it belongs to (`term`) before
//! acting, so a stop or a newer acquisition always wins over stale work.

use crate::config::ElectionConfig;
use crate::error::LeaderError;
use crate::lock::{DistributedLock, LockError, LockRegistry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lodestar_scheduler::{Scheduler, TaskHandle, TokioScheduler, task};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Where a replica is in the leadership lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Constructed, never started
    Idle,
    /// Trying to obtain the lock
    Acquiring,
    /// Holding and renewing the lock
    Leading,
    /// Giving the lock up
    Relinquishing,
    /// Stopped; [`LeaderElection::start`] begins a new run
    Stopped,
}

impl LifecycleState {
    /// Whether the state belongs to an active run
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Stopped)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Leading => "leading",
            Self::Relinquishing => "relinquishing",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Hooks invoked on leadership transitions.
///
/// A failing [`on_became_leader`](Self::on_became_leader) makes the manager
/// give the lock back; errors from
/// [`on_lost_leadership`](Self::on_lost_leadership) are only logged.
#[async_trait]
pub trait LeadershipCallbacks: Send + Sync {
    /// Called after the lock is acquired, before renewal is scheduled
    async fn on_became_leader(&self) -> Result<(), LeaderError>;

    /// Called after the lock is released
    async fn on_lost_leadership(&self) -> Result<(), LeaderError>;
}

/// Callbacks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

#[async_trait]
impl LeadershipCallbacks for NoopCallbacks {
    async fn on_became_leader(&self) -> Result<(), LeaderError> {
        Ok(())
    }

    async fn on_lost_leadership(&self) -> Result<(), LeaderError> {
        Ok(())
    }
}

/// Point-in-time view of an election
#[derive(Debug, Clone, Serialize)]
pub struct ElectionStatus {
    pub identity: String,
    pub lock_name: String,
    pub state: LifecycleState,
    pub running: bool,
    /// Number of successful acquisitions so far. Not a fencing token.
    pub term: u64,
    pub last_transition: Option<DateTime<Utc>>,
}

struct ElectionRecord {
    state: LifecycleState,
    running: bool,
    epoch: u64,
    term: u64,
    lock: Option<Arc<dyn DistributedLock>>,
    refresh: Option<TaskHandle>,
    pending: Option<TaskHandle>,
    last_transition: Option<DateTime<Utc>>,
}

impl ElectionRecord {
    fn is_current(&self, epoch: u64) -> bool {
        self.running && self.epoch == epoch
    }
}

struct ElectionInner {
    identity: String,
    config: ElectionConfig,
    registry: Arc<dyn LockRegistry>,
    scheduler: Arc<dyn Scheduler>,
    callbacks: Arc<dyn LeadershipCallbacks>,
    record: Mutex<ElectionRecord>,
    // Serializes gaining and losing leadership. Never taken while `record` is held.
    transitions: tokio::sync::Mutex<()>,
    state_tx: watch::Sender<LifecycleState>,
}

impl ElectionInner {
    fn transition_to(&self, record: &mut ElectionRecord, state: LifecycleState) {
        if record.state != state {
            debug!(
                identity = %self.identity,
                from = %record.state,
                to = %state,
                "Leadership state transition"
            );
        }
        record.state = state;
        record.last_transition = Some(Utc::now());
        self.state_tx.send_replace(state);
    }

    fn schedule_attempt(self: &Arc<Self>, record: &mut ElectionRecord, delay: Duration) {
        let weak = Arc::downgrade(self);
        let epoch = record.epoch;

        let handle = self.scheduler.schedule_once(
            task(move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.attempt_acquire(epoch).await;
                    }
                }
            }),
            Instant::now() + delay,
        );

        if let Some(previous) = record.pending.replace(handle) {
            previous.cancel();
        }
    }

    fn schedule_refresh(self: &Arc<Self>, record: &mut ElectionRecord, epoch: u64, term: u64) {
        if let Some(previous) = record.refresh.take() {
            previous.cancel();
        }

        let weak = Arc::downgrade(self);
        let period = self.config.renew_deadline();

        let handle = self.scheduler.schedule_at_fixed_rate(
            task(move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.refresh(epoch, term).await;
                    }
                }
            }),
            Instant::now() + period,
            period,
        );
        record.refresh = Some(handle);
    }

    fn retry(self: &Arc<Self>, epoch: u64) {
        let mut record = self.record.lock();
        if record.is_current(epoch) && record.lock.is_none() {
            self.schedule_attempt(&mut record, self.config.retry_period());
        }
    }

    async fn attempt_acquire(self: Arc<Self>, epoch: u64) {
        {
            let mut record = self.record.lock();
            if !record.is_current(epoch) {
                return;
            }
            record.pending = None;
        }

        let lock_name = self.config.lock_name();
        let wait = self.config.retry_period();

        let outcome = match self.registry.obtain(lock_name) {
            Ok(lock) => lock
                .try_acquire(wait)
                .await
                .map(|acquired| acquired.then_some(lock)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(Some(lock)) => self.on_acquired(epoch, lock).await,
            Ok(None) => {
                info!(
                    identity = %self.identity,
                    lock = %lock_name,
                    "Lock held by another replica, retrying in {:?}",
                    wait
                );
                self.retry(epoch);
            }
            Err(LockError::Interrupted) => {
                warn!(
                    identity = %self.identity,
                    lock = %lock_name,
                    "Lock acquisition interrupted, leaving election"
                );
                let mut record = self.record.lock();
                if record.is_current(epoch) {
                    record.running = false;
                    self.transition_to(&mut record, LifecycleState::Stopped);
                }
            }
            Err(e) => {
                error!(
                    identity = %self.identity,
                    lock = %lock_name,
                    "Lock acquisition failed: {}",
                    e
                );
                self.retry(epoch);
            }
        }
    }

    async fn on_acquired(self: Arc<Self>, epoch: u64, lock: Arc<dyn DistributedLock>) {
        let _transition = self.transitions.lock().await;

        let claimed = {
            let mut record = self.record.lock();
            if record.is_current(epoch) {
                record.term += 1;
                record.lock = Some(lock.clone());
                self.transition_to(&mut record, LifecycleState::Leading);
                Ok(record.term)
            } else {
                // A newer run shares this handle and re-acquires it re-entrantly.
                Err(!record.running && record.lock.is_none())
            }
        };

        let term = match claimed {
            Ok(term) => term,
            Err(release) => {
                debug!(identity = %self.identity, "Election stopped while acquiring, dropping lock");
                if release {
                    if let Err(e) = lock.release().await {
                        warn!(identity = %self.identity, "Failed to release stale lock: {}", e);
                    }
                }
                return;
            }
        };

        info!(
            identity = %self.identity,
            lock = %self.config.lock_name(),
            term,
            "Acquired leadership"
        );

        match self.callbacks.on_became_leader().await {
            Ok(()) => {
                let mut record = self.record.lock();
                // Otherwise a stop is queued on `transitions` and will relinquish.
                if record.is_current(epoch)
                    && record.term == term
                    && record.state == LifecycleState::Leading
                {
                    self.schedule_refresh(&mut record, epoch, term);
                }
            }
            Err(e) => {
                error!(
                    identity = %self.identity,
                    term,
                    "Leadership callback failed, relinquishing: {}",
                    e
                );
                if self.relinquish(Some(term)).await {
                    self.settle_after_loss(epoch, self.config.retry_period());
                }
            }
        }
    }

    async fn refresh(self: Arc<Self>, epoch: u64, term: u64) {
        let running = {
            let record = self.record.lock();
            if record.epoch != epoch || record.term != term || record.lock.is_none() {
                return;
            }
            record.running
        };

        if !running {
            self.handle_lock_lost(epoch, term).await;
            return;
        }

        let lock_name = self.config.lock_name();
        match self
            .registry
            .renew(lock_name, self.config.lease_duration())
            .await
        {
            Ok(()) => debug!(identity = %self.identity, lock = %lock_name, term, "Renewed lock"),
            Err(e) => {
                warn!(
                    identity = %self.identity,
                    lock = %lock_name,
                    term,
                    "Lock renewal failed: {}",
                    e
                );
                self.handle_lock_lost(epoch, term).await;
            }
        }
    }

    async fn handle_lock_lost(self: &Arc<Self>, epoch: u64, term: u64) {
        let _transition = self.transitions.lock().await;
        if self.relinquish(Some(term)).await {
            self.settle_after_loss(epoch, Duration::ZERO);
        }
    }

    /// Cancel renewal, release the lock and notify, in that order.
    ///
    /// Caller holds `transitions`. Returns `false` when there was nothing to
    /// give up, or when `term` no longer matches the held acquisition.
    async fn relinquish(&self, term: Option<u64>) -> bool {
        let (lock, refresh, held_term) = {
            let mut record = self.record.lock();
            if term.is_some_and(|term| term != record.term) {
                return false;
            }
            let Some(lock) = record.lock.take() else {
                return false;
            };
            let refresh = record.refresh.take();
            self.transition_to(&mut record, LifecycleState::Relinquishing);
            (lock, refresh, record.term)
        };

        warn!(
            identity = %self.identity,
            lock = %lock.name(),
            term = held_term,
            "Relinquishing leadership"
        );

        if let Some(refresh) = refresh {
            refresh.cancel();
        }

        if let Err(e) = lock.release().await {
            warn!(identity = %self.identity, "Failed to release lock: {}", e);
        }

        if let Err(e) = self.callbacks.on_lost_leadership().await {
            error!(identity = %self.identity, "Lost-leadership callback failed: {}", e);
        }

        drop(lock);
        true
    }

    fn settle_after_loss(self: &Arc<Self>, epoch: u64, delay: Duration) {
        let mut record = self.record.lock();
        if record.is_current(epoch) {
            self.transition_to(&mut record, LifecycleState::Acquiring);
            self.schedule_attempt(&mut record, delay);
        }
    }
}

impl Drop for ElectionInner {
    fn drop(&mut self) {
        let record = self.record.get_mut();
        for handle in [record.pending.take(), record.refresh.take()].into_iter().flatten() {
            handle.cancel();
        }
        if record.lock.is_some() {
            warn!(
                identity = %self.identity,
                lock = %self.config.lock_name(),
                "Election dropped while leading; lock will expire without release"
            );
        }
    }
}

/// Lock-based leader election for one replica.
///
/// Cheap to clone; clones drive the same election.
///
/// # Examples
///
/// ```rust,ignore
/// use lodestar_distributed::*;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let config = ElectionConfig::builder("orders")
///     .label_key("orders-leader")
///     .selector("app", "orders")
///     .build()?;
///
/// let client = redis::Client::open("redis://127.0.0.1/")?;
/// let conn = client.get_connection_manager().await?;
/// let registry = RedisLockRegistry::for_lock("orders", config.lease_duration(), conn);
///
/// let election = LeaderElectionBuilder::new(config)
///     .identity("orders-0")
///     .lock_registry(Arc::new(registry))
///     .build()?;
///
/// election.start();
/// // ...
/// election.stop().await;
/// ```
#[derive(Clone)]
pub struct LeaderElection {
    inner: Arc<ElectionInner>,
}

impl LeaderElection {
    /// Begin participating. Returns immediately; does nothing if already running.
    pub fn start(&self) {
        let inner = &self.inner;
        let mut record = inner.record.lock();
        if record.running {
            debug!(identity = %inner.identity, "Leader election already running");
            return;
        }

        record.running = true;
        record.epoch += 1;
        inner.transition_to(&mut record, LifecycleState::Acquiring);
        inner.schedule_attempt(&mut record, Duration::ZERO);

        info!(
            identity = %inner.identity,
            lock = %inner.config.lock_name(),
            "Starting leader election"
        );
    }

    /// Stop participating, giving up leadership if held.
    ///
    /// Release and callback failures are logged. Calling this more than once
    /// is harmless.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let epoch = {
            let mut record = inner.record.lock();
            if !record.running && !record.state.is_active() {
                return;
            }
            record.running = false;
            if let Some(pending) = record.pending.take() {
                pending.cancel();
            }
            record.epoch
        };

        info!(identity = %inner.identity, "Stopping leader election");

        let _transition = inner.transitions.lock().await;
        inner.relinquish(None).await;

        let mut record = inner.record.lock();
        if let Some(refresh) = record.refresh.take() {
            refresh.cancel();
        }
        if record.epoch == epoch && !record.running {
            inner.transition_to(&mut record, LifecycleState::Stopped);
        }
    }

    /// Between [`start`](Self::start) and completion of [`stop`](Self::stop)
    pub fn is_running(&self) -> bool {
        self.state().is_active()
    }

    /// Whether this replica currently believes it is the leader
    pub fn is_leader(&self) -> bool {
        self.state() == LifecycleState::Leading
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.inner.record.lock().state
    }

    /// Number of successful acquisitions so far
    pub fn term(&self) -> u64 {
        self.inner.record.lock().term
    }

    /// Snapshot of the election
    pub fn status(&self) -> ElectionStatus {
        let record = self.inner.record.lock();
        ElectionStatus {
            identity: self.inner.identity.clone(),
            lock_name: self.inner.config.lock_name().to_string(),
            state: record.state,
            running: record.running,
            term: record.term,
            last_transition: record.last_transition,
        }
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state_tx.subscribe()
    }

    /// This replica's identity
    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    /// Election configuration
    pub fn config(&self) -> &ElectionConfig {
        &self.inner.config
    }
}

impl fmt::Debug for LeaderElection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaderElection")
            .field("identity", &self.inner.identity)
            .field("lock_name", &self.inner.config.lock_name())
            .field("state", &self.state())
            .finish()
    }
}

/// Leader election builder
pub struct LeaderElectionBuilder {
    config: ElectionConfig,
    identity: Option<String>,
    registry: Option<Arc<dyn LockRegistry>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    callbacks: Option<Arc<dyn LeadershipCallbacks>>,
}

impl LeaderElectionBuilder {
    /// Create new builder
    pub fn new(config: ElectionConfig) -> Self {
        Self {
            config,
            identity: None,
            registry: None,
            scheduler: None,
            callbacks: None,
        }
    }

    /// Set the replica identity. A random one is generated when unset.
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Set the lock registry (required)
    pub fn lock_registry(mut self, registry: Arc<dyn LockRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the scheduler. Defaults to a [`TokioScheduler`] on the current runtime.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Set the transition callbacks
    pub fn callbacks(mut self, callbacks: Arc<dyn LeadershipCallbacks>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    /// Build the election
    pub fn build(self) -> Result<LeaderElection, LeaderError> {
        let identity = self.identity.unwrap_or_else(|| Uuid::new_v4().to_string());
        if identity.trim().is_empty() {
            return Err(LeaderError::InvalidConfig("identity cannot be empty".to_string()));
        }

        let registry = self
            .registry
            .ok_or_else(|| LeaderError::InvalidConfig("lock registry is required".to_string()))?;

        let scheduler: Arc<dyn Scheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(
                TokioScheduler::current().map_err(|e| LeaderError::InvalidConfig(e.to_string()))?,
            ),
        };

        let callbacks = self.callbacks.unwrap_or_else(|| Arc::new(NoopCallbacks));
        let (state_tx, _) = watch::channel(LifecycleState::Idle);

        Ok(LeaderElection {
            inner: Arc::new(ElectionInner {
                identity,
                config: self.config,
                registry,
                scheduler,
                callbacks,
                record: Mutex::new(ElectionRecord {
                    state: LifecycleState::Idle,
                    running: false,
                    epoch: 0,
                    term: 0,
                    lock: None,
                    refresh: None,
                    pending: None,
                    last_transition: None,
                }),
                transitions: tokio::sync::Mutex::new(()),
                state_tx,
            }),
        })
    }
}
