//! End-to-end election scenarios across the lock, scheduler and reflector.

use async_trait::async_trait;
use lodestar::*;
use lodestar_config::{ConfigManager, ENV_PREFIX, ElectorSettings};
use lodestar_testing::*;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;

const NAMESPACE: &str = "prod";

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

async fn cluster(names: &[&str]) -> InMemoryMetadata {
    let metadata = InMemoryMetadata::new();
    for name in names {
        metadata
            .insert_object(ObjectRef::new(NAMESPACE, *name).with_label("app", "orders"))
            .await;
    }
    metadata
}

fn reflector(identity: &str, metadata: &InMemoryMetadata) -> Arc<dyn LeadershipCallbacks> {
    Arc::new(LeadershipReflector::new(
        Arc::new(metadata.clone()),
        identity,
        NAMESPACE,
        &config(),
    ))
}

/// Runs several callbacks in order, stopping at the first failure.
struct Chain(Vec<Arc<dyn LeadershipCallbacks>>);

#[async_trait]
impl LeadershipCallbacks for Chain {
    async fn on_became_leader(&self) -> Result<(), LeaderError> {
        for callbacks in &self.0 {
            callbacks.on_became_leader().await?;
        }
        Ok(())
    }

    async fn on_lost_leadership(&self) -> Result<(), LeaderError> {
        for callbacks in &self.0 {
            callbacks.on_lost_leadership().await?;
        }
        Ok(())
    }
}

/// Records the election state seen from inside each callback.
#[derive(Default)]
struct StateObserver {
    election: OnceLock<LeaderElection>,
    seen: Mutex<Vec<LifecycleState>>,
}

impl StateObserver {
    fn observe(&self) {
        if let Some(election) = self.election.get() {
            self.seen.lock().push(election.state());
        }
    }
}

#[async_trait]
impl LeadershipCallbacks for StateObserver {
    async fn on_became_leader(&self) -> Result<(), LeaderError> {
        self.observe();
        Ok(())
    }

    async fn on_lost_leadership(&self) -> Result<(), LeaderError> {
        self.observe();
        Ok(())
    }
}

fn replica(
    identity: &str,
    store: &InMemoryLockStore,
    callbacks: Arc<dyn LeadershipCallbacks>,
) -> LeaderElection {
    let registry = InMemoryLockRegistry::new(store.clone(), Duration::from_secs(10));
    LeaderElectionBuilder::new(config())
        .identity(identity)
        .lock_registry(Arc::new(registry))
        .callbacks(callbacks)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn first_replica_leads_while_second_keeps_retrying() {
    let store = InMemoryLockStore::new();
    let metadata = cluster(&["r1", "r2"]).await;
    let follower_callbacks = RecordingCallbacks::new();

    let r1 = replica("r1", &store, reflector("r1", &metadata));
    let r2 = replica(
        "r2",
        &store,
        Arc::new(Chain(vec![
            reflector("r2", &metadata),
            Arc::new(follower_callbacks.clone()) as Arc<dyn LeadershipCallbacks>,
        ])),
    );

    r1.start();
    assert!(wait_for_state(&r1, LifecycleState::Leading, Duration::from_secs(1)).await);
    r2.start();

    // Many retry periods and several renewals
    tokio::time::sleep(Duration::from_secs(60)).await;

    let elections = [r1.clone(), r2.clone()];
    assert_eq!(assert_single_leader(&elections).identity(), "r1");
    assert_state(&r2, LifecycleState::Acquiring);
    assert_eq!(follower_callbacks.became_leader_calls(), 0);
    assert!(store.holder("orders").is_some());

    assert_eq!(metadata.label(NAMESPACE, "r1", "orders-leader").await.as_deref(), Some("true"));
    assert_eq!(metadata.label(NAMESPACE, "r2", "orders-leader").await.as_deref(), Some("false"));

    r1.stop().await;
    r2.stop().await;
}

#[tokio::test(start_paused = true)]
async fn follower_takes_over_after_leader_stops() {
    let store = InMemoryLockStore::new();
    let metadata = cluster(&["r1", "r2"]).await;

    let r1 = replica("r1", &store, reflector("r1", &metadata));
    let r2 = replica("r2", &store, reflector("r2", &metadata));

    r1.start();
    assert!(wait_for_state(&r1, LifecycleState::Leading, Duration::from_secs(1)).await);
    r2.start();
    tokio::time::sleep(Duration::from_secs(3)).await;

    r1.stop().await;
    assert_state(&r1, LifecycleState::Stopped);

    assert!(wait_for_state(&r2, LifecycleState::Leading, Duration::from_secs(5)).await);
    assert_eq!(metadata.label(NAMESPACE, "r1", "orders-leader").await.as_deref(), Some("false"));
    assert_eq!(metadata.label(NAMESPACE, "r2", "orders-leader").await.as_deref(), Some("true"));

    r2.stop().await;
    assert_no_leader(&[r1, r2]);
}

#[tokio::test(start_paused = true)]
async fn expired_lease_is_given_up_and_reacquired() {
    let store = InMemoryLockStore::new();
    let callbacks = RecordingCallbacks::new();
    let r1 = replica("r1", &store, Arc::new(callbacks.clone()));

    r1.start();
    assert!(wait_for_state(&r1, LifecycleState::Leading, Duration::from_secs(1)).await);
    assert_eq!(r1.term(), 1);

    store.expire("orders");

    // Next renewal notices, gives up and immediately competes again
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_state(&r1, LifecycleState::Leading);
    assert_eq!(r1.term(), 2);
    assert_eq!(callbacks.lost_leadership_calls(), 1);
    assert_eq!(callbacks.became_leader_calls(), 2);

    r1.stop().await;
}

#[tokio::test(start_paused = true)]
async fn at_most_one_leader_at_any_time() {
    let store = InMemoryLockStore::new();
    let elections: Vec<LeaderElection> = ["r1", "r2", "r3"]
        .iter()
        .map(|name| replica(name, &store, Arc::new(NoopCallbacks)))
        .collect();

    for election in &elections {
        election.start();
    }

    for _ in 0..30 {
        tokio::time::sleep(Duration::from_millis(700)).await;
        let leaders = elections.iter().filter(|e| e.is_leader()).count();
        assert!(leaders <= 1, "{} replicas believe they lead", leaders);
    }
    assert_single_leader(&elections);

    for election in &elections {
        election.stop().await;
    }
    assert_no_leader(&elections);
}

#[tokio::test]
async fn renewal_failure_relinquishes_in_order() {
    let journal = Journal::new();
    let scheduler = ManualScheduler::new();
    let registry = ScriptedLockRegistry::with_journal(journal.clone());
    let recording = RecordingCallbacks::with_journal(journal.clone());
    let observer = Arc::new(StateObserver::default());
    let metadata = cluster(&["r1", "r2"]).await;

    let election = LeaderElectionBuilder::new(config())
        .identity("r1")
        .lock_registry(Arc::new(registry.clone()))
        .scheduler(Arc::new(scheduler.clone()))
        .callbacks(Arc::new(Chain(vec![
            reflector("r1", &metadata),
            observer.clone() as Arc<dyn LeadershipCallbacks>,
            Arc::new(recording.clone()),
        ])))
        .build()
        .unwrap();
    assert!(observer.election.set(election.clone()).is_ok());

    election.start();
    assert!(scheduler.run_next_once().await);
    assert_state(&election, LifecycleState::Leading);
    assert_eq!(metadata.label(NAMESPACE, "r1", "orders-leader").await.as_deref(), Some("true"));

    let refresh = scheduler.active(TaskKind::FixedRate);
    assert_eq!(refresh.len(), 1);
    assert_eq!(refresh[0].period, Some(Duration::from_secs(4)));

    registry.fail_next_renewal();
    assert!(scheduler.tick().await);

    assert_state(&election, LifecycleState::Acquiring);
    assert_eq!(
        *observer.seen.lock(),
        vec![LifecycleState::Leading, LifecycleState::Relinquishing]
    );
    assert_eq!(refresh[0].handle.cancel_requests(), 1);
    assert!(refresh[0].handle.is_cancelled());
    assert_eq!(metadata.label(NAMESPACE, "r1", "orders-leader").await.as_deref(), Some("false"));

    let release = journal.position("release").unwrap();
    let lost = journal.position("lost_leadership").unwrap();
    assert!(release < lost, "journal: {:?}", journal.events());
    assert_eq!(recording.lost_leadership_calls(), 1);

    // Competes again right away
    assert_eq!(scheduler.active(TaskKind::Once).len(), 1);
    assert!(scheduler.run_next_once().await);
    assert_state(&election, LifecycleState::Leading);
    assert_eq!(election.term(), 2);
    assert_eq!(scheduler.fixed_rate_count(), 2);

    election.stop().await;
}

#[tokio::test]
async fn failed_leader_callback_backs_off_for_retry_period() {
    let scheduler = ManualScheduler::new();
    let registry = ScriptedLockRegistry::new();
    let callbacks = RecordingCallbacks::new();
    callbacks.fail_became_leader(true);

    let election = LeaderElectionBuilder::new(config())
        .identity("r1")
        .lock_registry(Arc::new(registry.clone()))
        .scheduler(Arc::new(scheduler.clone()))
        .callbacks(Arc::new(callbacks.clone()))
        .build()
        .unwrap();

    election.start();
    let before = Instant::now();
    assert!(scheduler.run_next_once().await);

    assert_state(&election, LifecycleState::Acquiring);
    assert_eq!(registry.releases(), 1);
    assert_eq!(callbacks.lost_leadership_calls(), 1);
    assert_eq!(scheduler.fixed_rate_count(), 0);

    let retry = scheduler.active(TaskKind::Once);
    assert_eq!(retry.len(), 1);
    assert!(retry[0].due >= before + Duration::from_secs(1));

    election.stop().await;
    assert_state(&election, LifecycleState::Stopped);
}

#[tokio::test]
async fn interrupted_acquisition_leaves_the_election() {
    let scheduler = ManualScheduler::new();
    let registry = ScriptedLockRegistry::new();
    registry.script_acquire([AcquireOutcome::Interrupted]);

    let election = LeaderElectionBuilder::new(config())
        .identity("r1")
        .lock_registry(Arc::new(registry.clone()))
        .scheduler(Arc::new(scheduler.clone()))
        .build()
        .unwrap();

    election.start();
    assert!(scheduler.run_next_once().await);

    assert_state(&election, LifecycleState::Stopped);
    assert!(!election.is_running());
    assert!(scheduler.active(TaskKind::Once).is_empty());
    assert_eq!(registry.releases(), 0);
}

#[tokio::test]
async fn busy_and_unavailable_lock_are_retried() {
    let scheduler = ManualScheduler::new();
    let registry = ScriptedLockRegistry::new();
    registry.script_acquire([AcquireOutcome::Busy, AcquireOutcome::Unavailable]);

    let election = LeaderElectionBuilder::new(config())
        .identity("r1")
        .lock_registry(Arc::new(registry.clone()))
        .scheduler(Arc::new(scheduler.clone()))
        .build()
        .unwrap();

    election.start();
    assert!(scheduler.run_next_once().await);
    assert_state(&election, LifecycleState::Acquiring);
    assert!(scheduler.run_next_once().await);
    assert_state(&election, LifecycleState::Acquiring);
    assert!(scheduler.run_next_once().await);
    assert_state(&election, LifecycleState::Leading);
    assert_eq!(registry.acquire_attempts(), 3);

    election.stop().await;
}

#[tokio::test]
async fn stop_is_idempotent() {
    let scheduler = ManualScheduler::new();
    let registry = ScriptedLockRegistry::new();
    let callbacks = RecordingCallbacks::new();

    let election = LeaderElectionBuilder::new(config())
        .identity("r1")
        .lock_registry(Arc::new(registry.clone()))
        .scheduler(Arc::new(scheduler.clone()))
        .callbacks(Arc::new(callbacks.clone()))
        .build()
        .unwrap();

    // Never started
    election.stop().await;
    assert_state(&election, LifecycleState::Idle);

    election.start();
    assert!(scheduler.run_next_once().await);
    election.stop().await;
    election.stop().await;

    assert_state(&election, LifecycleState::Stopped);
    assert_eq!(registry.releases(), 1);
    assert_eq!(callbacks.lost_leadership_calls(), 1);
    assert!(scheduler.active(TaskKind::FixedRate).is_empty());

    // A late refresh tick finds nothing to do
    assert!(!scheduler.tick().await);
    assert_eq!(registry.renewals(), 0);
}

#[test]
fn renew_deadline_longer_than_lease_is_rejected() {
    let result = ElectionConfig::builder("orders")
        .label_key("orders-leader")
        .selector("app", "orders")
        .lease_duration(Duration::from_secs(120))
        .renew_deadline(Duration::from_secs(200))
        .build();
    assert!(matches!(result, Err(LeaderError::InvalidConfig(_))));

    let manager = ConfigManager::with_prefix(ENV_PREFIX);
    manager.load_env_from(
        [
            ("ELECTOR_IDENTITY", "r1"),
            ("ELECTOR_NAMESPACE", NAMESPACE),
            ("ELECTOR_LOCK_NAME", "orders"),
            ("ELECTOR_LABEL_KEY", "orders-leader"),
            ("ELECTOR_SELECTOR_KEY", "app"),
            ("ELECTOR_SELECTOR_VALUE", "orders"),
            ("ELECTOR_LEASE_DURATION", "120s"),
            ("ELECTOR_RENEW_DEADLINE", "200s"),
        ]
        .map(|(k, v)| (k.to_string(), v.to_string())),
    );
    assert!(ElectorSettings::resolve(&manager, |_| None).is_err());
}
