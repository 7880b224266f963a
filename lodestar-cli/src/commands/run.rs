//! Join the election and keep pod labels in sync until shut down.

use crate::commands::SettingsArgs;
use crate::error::CliResult;
use lodestar_config::ElectorSettings;
use lodestar_distributed::{
    KubernetesMetadata, LeaderElection, LeaderElectionBuilder, LeadershipReflector,
    RedisLockRegistry,
};
use lodestar_scheduler::{SchedulerConfig, TokioScheduler};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub async fn run(args: &SettingsArgs, verbose: bool) -> CliResult<()> {
    let settings = args.load()?;
    let config = settings.election_config()?;

    info!(
        identity = %settings.identity,
        namespace = %settings.namespace,
        lock = %config.lock_name(),
        "Starting elector"
    );

    let client = redis::Client::open(settings.redis_url.as_str())?;
    let conn = client.get_connection_manager().await?;
    let registry = RedisLockRegistry::for_lock(config.lock_name(), config.lease_duration(), conn);

    let metadata = KubernetesMetadata::try_default().await?;
    let reflector = reflector(&settings, Arc::new(metadata), &config);

    let scheduler = Arc::new(TokioScheduler::with_config(
        Handle::current(),
        SchedulerConfig {
            name: format!("{}-elector", config.lock_name()),
            log_execution: verbose,
        },
    ));

    let election = LeaderElectionBuilder::new(config)
        .identity(settings.identity.clone())
        .lock_registry(Arc::new(registry))
        .scheduler(scheduler.clone())
        .callbacks(Arc::new(reflector))
        .build()?;

    election.start();
    let watcher = watch_state(&election);

    let signal = shutdown_signal().await;
    if let Err(e) = &signal {
        warn!(error = %e, "Signal handling failed, shutting down");
    }

    info!("Stopping elector");
    election.stop().await;
    watcher.abort();
    scheduler.shutdown();
    info!(identity = %settings.identity, "Elector stopped");

    signal
}

fn reflector(
    settings: &ElectorSettings,
    metadata: Arc<KubernetesMetadata>,
    config: &lodestar_distributed::ElectionConfig,
) -> LeadershipReflector {
    let reflector =
        LeadershipReflector::new(metadata, settings.identity.clone(), settings.namespace.clone(), config);
    match settings.leader_info_name() {
        Some(name) => reflector.with_leader_info(name),
        None => reflector,
    }
}

/// Log every lifecycle change.
fn watch_state(election: &LeaderElection) -> JoinHandle<()> {
    let election = election.clone();
    let mut states = election.subscribe();

    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            info!(
                identity = %election.identity(),
                state = %state,
                term = election.term(),
                "Election state changed"
            );
        }
    })
}

async fn shutdown_signal() -> CliResult<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
