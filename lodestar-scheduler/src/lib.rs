//! Task scheduling for Lodestar.
//!
//! Provides the scheduler used to drive leader election:
//! - ⏱️ One-shot tasks at a future instant
//! - 🔁 Fixed-rate tasks that never overlap themselves
//! - ❌ Idempotent, cooperative cancellation through [`TaskHandle`]
//! - 🧹 Shutdown that cancels every outstanding task
//!
//! ## Quick Start
//!
//! ```no_run
//! use lodestar_scheduler::*;
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SchedulerError> {
//!     let scheduler = TokioScheduler::current()?;
//!
//!     // Run once, five seconds from now
//!     let once = scheduler.schedule_once(
//!         task(|| async { println!("once") }),
//!         Instant::now() + Duration::from_secs(5),
//!     );
//!
//!     // Run every second, starting in one second
//!     let ticker = scheduler.schedule_at_fixed_rate(
//!         task(|| async { println!("tick") }),
//!         Instant::now() + Duration::from_secs(1),
//!         Duration::from_secs(1),
//!     );
//!
//!     tokio::time::sleep(Duration::from_secs(10)).await;
//!     ticker.cancel();
//!     once.cancel();
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod handle;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use handle::TaskHandle;
pub use scheduler::{Scheduler, SchedulerConfig, Task, TaskFuture, TokioScheduler, task};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{SchedulerError, SchedulerResult};
    pub use crate::handle::TaskHandle;
    pub use crate::scheduler::{Scheduler, SchedulerConfig, Task, TokioScheduler, task};
}
