//! Stop and restart racing in-flight acquisitions and callbacks.

use async_trait::async_trait;
use lodestar::*;
use lodestar_testing::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

fn config() -> ElectionConfig {
    ElectionConfig::builder("orders")
        .label_key("orders-leader")
        .selector("app", "orders")
        .lease_duration(Duration::from_secs(10))
        .renew_deadline(Duration::from_secs(4))
        .retry_period(Duration::from_secs(1))
        .build()
        .unwrap()
}

async fn until(condition: impl Fn() -> bool) {
    while !condition() {
        tokio::task::yield_now().await;
    }
}

/// One shared handle whose acquisitions wait for a permit, first come first served.
#[derive(Clone)]
struct GatedLockRegistry {
    lock: Arc<GatedLock>,
}

struct GatedLock {
    gate: Semaphore,
    entered: AtomicUsize,
    releases: AtomicUsize,
    held: AtomicBool,
}

impl GatedLockRegistry {
    fn new() -> Self {
        Self {
            lock: Arc::new(GatedLock {
                gate: Semaphore::new(0),
                entered: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                held: AtomicBool::new(false),
            }),
        }
    }

    fn open(&self) {
        self.lock.gate.add_permits(1);
    }

    fn entered(&self) -> usize {
        self.lock.entered.load(Ordering::SeqCst)
    }

    fn releases(&self) -> usize {
        self.lock.releases.load(Ordering::SeqCst)
    }

    fn held(&self) -> bool {
        self.lock.held.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DistributedLock for GatedLock {
    fn name(&self) -> &str {
        "orders"
    }

    async fn try_acquire(&self, _wait: Duration) -> Result<bool, LockError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await.map_err(|_| LockError::Interrupted)?;
        permit.forget();
        self.held.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn release(&self) -> Result<(), LockError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.held.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl LockRegistry for GatedLockRegistry {
    fn obtain(&self, _name: &str) -> Result<Arc<dyn DistributedLock>, LockError> {
        Ok(self.lock.clone())
    }

    async fn renew(&self, _name: &str, _ttl: Duration) -> Result<(), LockError> {
        Ok(())
    }
}

/// Callbacks whose `on_became_leader` blocks until the test lets it finish.
#[derive(Clone)]
struct GatedCallbacks {
    gate: Arc<Semaphore>,
    became: Arc<AtomicUsize>,
    lost: Arc<AtomicUsize>,
}

impl GatedCallbacks {
    fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            became: Arc::new(AtomicUsize::new(0)),
            lost: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl LeadershipCallbacks for GatedCallbacks {
    async fn on_became_leader(&self) -> Result<(), LeaderError> {
        self.became.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| LeaderError::Callback(e.to_string()))?;
        permit.forget();
        Ok(())
    }

    async fn on_lost_leadership(&self) -> Result<(), LeaderError> {
        self.lost.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn election(
    registry: Arc<dyn LockRegistry>,
    scheduler: &ManualScheduler,
    callbacks: Arc<dyn LeadershipCallbacks>,
) -> LeaderElection {
    LeaderElectionBuilder::new(config())
        .identity("r1")
        .lock_registry(registry)
        .scheduler(Arc::new(scheduler.clone()))
        .callbacks(callbacks)
        .build()
        .unwrap()
}

#[tokio::test]
async fn restart_keeps_lock_won_by_the_stopped_run() {
    let registry = GatedLockRegistry::new();
    let scheduler = ManualScheduler::new();
    let callbacks = RecordingCallbacks::new();
    let election = election(Arc::new(registry.clone()), &scheduler, Arc::new(callbacks.clone()));

    election.start();
    let first = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run_next_once().await }
    });
    until(|| registry.entered() == 1).await;

    election.stop().await;
    assert_state(&election, LifecycleState::Stopped);

    election.start();
    let second = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run_next_once().await }
    });
    until(|| registry.entered() == 2).await;

    // The stopped run wins the lock first; the new run takes it over
    registry.open();
    assert!(first.await.unwrap());
    assert_eq!(registry.releases(), 0);

    registry.open();
    assert!(second.await.unwrap());

    assert_state(&election, LifecycleState::Leading);
    assert_eq!(election.status().term, 1);
    assert_eq!(registry.releases(), 0);
    assert!(registry.held());
    assert_eq!(callbacks.became_leader_calls(), 1);
    assert_eq!(scheduler.active(TaskKind::FixedRate).len(), 1);

    election.stop().await;
    assert_eq!(registry.releases(), 1);
    assert!(!registry.held());
}

#[tokio::test]
async fn stop_releases_lock_acquired_after_it() {
    let registry = GatedLockRegistry::new();
    let scheduler = ManualScheduler::new();
    let callbacks = RecordingCallbacks::new();
    let election = election(Arc::new(registry.clone()), &scheduler, Arc::new(callbacks.clone()));

    election.start();
    let attempt = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run_next_once().await }
    });
    until(|| registry.entered() == 1).await;

    election.stop().await;
    registry.open();
    assert!(attempt.await.unwrap());

    assert_state(&election, LifecycleState::Stopped);
    assert_eq!(registry.releases(), 1);
    assert!(!registry.held());
    assert_eq!(callbacks.became_leader_calls(), 0);
    assert!(scheduler.active(TaskKind::Once).is_empty());
    assert_eq!(scheduler.fixed_rate_count(), 0);
}

#[tokio::test]
async fn stop_during_became_leader_callback_relinquishes() {
    let registry = ScriptedLockRegistry::new();
    let scheduler = ManualScheduler::new();
    let callbacks = GatedCallbacks::new();
    let election = election(Arc::new(registry.clone()), &scheduler, Arc::new(callbacks.clone()));

    election.start();
    let attempt = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run_next_once().await }
    });
    until(|| callbacks.became.load(Ordering::SeqCst) == 1).await;
    assert_state(&election, LifecycleState::Leading);

    let stopping = tokio::spawn({
        let election = election.clone();
        async move { election.stop().await }
    });
    until(|| !election.status().running).await;

    callbacks.gate.add_permits(1);
    assert!(attempt.await.unwrap());
    stopping.await.unwrap();

    assert_state(&election, LifecycleState::Stopped);
    assert!(scheduler.active(TaskKind::FixedRate).is_empty());
    assert_eq!(scheduler.fixed_rate_count(), 0);
    assert!(scheduler.active(TaskKind::Once).is_empty());
    assert_eq!(registry.releases(), 1);
    assert_eq!(registry.renewals(), 0);
    assert_eq!(callbacks.lost.load(Ordering::SeqCst), 1);
}
