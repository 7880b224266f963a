//! Testing utilities for Lodestar.
//!
//! Deterministic doubles for every collaborator of the leader election.
//!
//! ## Features
//!
//! - 🕹️ **ManualScheduler** - Tasks run only when the test says so
//! - 🔒 **ScriptedLockRegistry** - Scripted acquire / renew / release outcomes
//! - 📼 **RecordingCallbacks** - Counted, optionally failing transition hooks
//! - 💥 **FaultyMetadataClient** - Spy wrapper injecting metadata failures
//! - 📓 **Journal** - Shared, ordered event log across doubles
//! - ✅ **Assertions** - Leader / state assertions
//!
//! ## Quick Start
//!
//! ```no_run
//! use lodestar_distributed::{ElectionConfig, LeaderElectionBuilder, LifecycleState};
//! use lodestar_testing::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let scheduler = ManualScheduler::new();
//! let registry = ScriptedLockRegistry::new();
//! let callbacks = RecordingCallbacks::new();
//!
//! let config = ElectionConfig::builder("orders")
//!     .label_key("orders-leader")
//!     .selector("app", "orders")
//!     .build()
//!     .unwrap();
//!
//! let election = LeaderElectionBuilder::new(config)
//!     .identity("orders-0")
//!     .lock_registry(Arc::new(registry.clone()))
//!     .scheduler(Arc::new(scheduler.clone()))
//!     .callbacks(Arc::new(callbacks.clone()))
//!     .build()
//!     .unwrap();
//!
//! election.start();
//! scheduler.run_once_tasks(10).await;
//!
//! assert_state(&election, LifecycleState::Leading);
//! assert_eq!(callbacks.became_leader_calls(), 1);
//! # });
//! ```

mod assertions;
mod callbacks;
mod journal;
mod lock;
mod metadata;
mod scheduler;

pub use assertions::{assert_no_leader, assert_single_leader, assert_state, wait_for_state};
pub use callbacks::RecordingCallbacks;
pub use journal::Journal;
pub use lock::{AcquireOutcome, ScriptedLockRegistry};
pub use metadata::{FaultyMetadataClient, LabelPatch};
pub use scheduler::{ManualScheduler, ScheduledTask, TaskKind};
