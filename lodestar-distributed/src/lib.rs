//! Lock-based leader election for Lodestar
//!
//! This crate elects a single leader among the replicas of a deployment and
//! makes the result visible in cluster metadata.
//!
//! ## Features
//!
//! - **Distributed Locks** - Redis-backed and in-memory lock registries
//! - **Leader Election** - Acquire / renew / lose / retry state machine
//! - **Metadata Reflection** - Leader and peer labels kept in sync on every transition
//! - **Kubernetes** - Pod label client behind the `kubernetes` feature
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lodestar_distributed::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ElectionConfig::builder("orders")
//!         .label_key("orders-leader")
//!         .selector("app", "orders")
//!         .build()?;
//!
//!     // Connect to Redis
//!     let client = redis::Client::open("redis://127.0.0.1/")?;
//!     let conn = client.get_connection_manager().await?;
//!     let registry = RedisLockRegistry::for_lock("orders", config.lease_duration(), conn);
//!
//!     // Label pods as leader / follower
//!     let metadata = KubernetesMetadata::try_default().await?;
//!     let reflector = LeadershipReflector::new(Arc::new(metadata), "orders-0", "prod", &config);
//!
//!     let election = LeaderElectionBuilder::new(config)
//!         .identity("orders-0")
//!         .lock_registry(Arc::new(registry))
//!         .callbacks(Arc::new(reflector))
//!         .build()?;
//!
//!     election.start();
//!     tokio::signal::ctrl_c().await?;
//!     election.stop().await;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod leader;
pub mod lock;
pub mod memory_lock;
pub mod memory_metadata;
pub mod metadata;
pub mod redis_lock;
pub mod reflector;

#[cfg(feature = "kubernetes")]
pub mod kubernetes;

pub use config::{ElectionConfig, ElectionConfigBuilder};
pub use error::LeaderError;
pub use leader::{
    ElectionStatus, LeaderElection, LeaderElectionBuilder, LeadershipCallbacks, LifecycleState,
    NoopCallbacks,
};
pub use lock::{DistributedLock, LockError, LockRegistry};
pub use memory_lock::{InMemoryLock, InMemoryLockRegistry, InMemoryLockStore};
pub use memory_metadata::InMemoryMetadata;
pub use metadata::{MetadataClient, MetadataError, ObjectRef};
pub use redis_lock::{RedisLock, RedisLockRegistry};
pub use reflector::{LEADER_INFO_KEY, LeadershipReflector};

#[cfg(feature = "kubernetes")]
pub use kubernetes::KubernetesMetadata;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::ElectionConfig;
    pub use crate::error::LeaderError;
    pub use crate::leader::{LeaderElection, LeaderElectionBuilder, LeadershipCallbacks, LifecycleState};
    pub use crate::lock::{DistributedLock, LockRegistry};
    pub use crate::metadata::MetadataClient;
    pub use crate::reflector::LeadershipReflector;
}
