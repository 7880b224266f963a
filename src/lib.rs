// Lodestar - lock-based leader election reflected onto pod labels
//
// Replicas compete for a shared distributed lock. The holder renews it on a
// fixed schedule and labels itself the leader; everyone else is labelled a
// follower.

// Re-export the election core
pub use lodestar_distributed::*;

// Re-export the scheduler
pub use lodestar_scheduler as scheduler;
pub use lodestar_scheduler::{Scheduler, TaskHandle, TokioScheduler};

// Re-export optional crates
#[cfg(feature = "config")]
pub use lodestar_config;

#[cfg(feature = "testing")]
pub use lodestar_testing;

pub mod prelude {
    pub use lodestar_distributed::prelude::*;
    pub use lodestar_scheduler::{Scheduler, TaskHandle, TokioScheduler};

    #[cfg(feature = "config")]
    pub use lodestar_config::{ConfigManager, ElectorSettings};
}
