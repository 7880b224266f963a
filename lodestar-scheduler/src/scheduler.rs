//! Task scheduler.

use crate::error::{SchedulerError, SchedulerResult};
use crate::handle::TaskHandle;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Future produced by a scheduled task.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A callable that can be run by a [`Scheduler`], possibly many times.
pub type Task = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Wrap an async closure into a [`Task`].
///
/// # Examples
///
/// ```
/// use lodestar_scheduler::task;
///
/// let ping = task(|| async {
///     println!("ping");
/// });
/// # let _ = ping;
/// ```
pub fn task<F, Fut>(function: F) -> Task
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || Box::pin(function()))
}

/// Executes callables at a future instant, once or at a fixed rate.
///
/// Tasks may run concurrently with each other and with the code that
/// scheduled them.
pub trait Scheduler: Send + Sync {
    /// Run `task` once at `at`.
    fn schedule_once(&self, task: Task, at: Instant) -> TaskHandle;

    /// Run `task` at `first` and then every `period` until cancelled.
    ///
    /// A run never overlaps the previous run of the same task.
    fn schedule_at_fixed_rate(&self, task: Task, first: Instant, period: Duration) -> TaskHandle;
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Name used in log output
    pub name: String,

    /// Whether to log every task execution at debug level
    pub log_execution: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "lodestar-scheduler".to_string(),
            log_execution: false,
        }
    }
}

/// Scheduler backed by tasks spawned on a tokio runtime.
#[derive(Clone)]
pub struct TokioScheduler {
    runtime: Handle,
    config: SchedulerConfig,
    tasks: Arc<Mutex<Vec<TaskHandle>>>,
    shut_down: Arc<AtomicBool>,
    executions: Arc<AtomicU64>,
}

impl TokioScheduler {
    /// Create a scheduler that spawns onto the given runtime.
    pub fn new(runtime: Handle) -> Self {
        Self::with_config(runtime, SchedulerConfig::default())
    }

    /// Create a scheduler with custom configuration.
    pub fn with_config(runtime: Handle, config: SchedulerConfig) -> Self {
        debug!(scheduler = %config.name, "Initializing scheduler");
        Self {
            runtime,
            config,
            tasks: Arc::new(Mutex::new(Vec::new())),
            shut_down: Arc::new(AtomicBool::new(false)),
            executions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a scheduler on the runtime the caller is running in.
    pub fn current() -> SchedulerResult<Self> {
        let runtime = Handle::try_current().map_err(|e| SchedulerError::NoRuntime(e.to_string()))?;
        Ok(Self::new(runtime))
    }

    /// Number of tasks that are neither cancelled nor finished.
    pub fn active_tasks(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(TaskHandle::is_active);
        tasks.len()
    }

    /// Total number of task executions started so far.
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Cancel every outstanding task and refuse new ones.
    ///
    /// Executions already in progress finish normally.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let tasks: Vec<TaskHandle> = self.tasks.lock().drain(..).collect();
        let cancelled = tasks.iter().filter(|handle| handle.cancel()).count();
        info!(scheduler = %self.config.name, cancelled, "Scheduler shut down");
    }

    fn register(&self) -> SchedulerResult<TaskHandle> {
        if self.is_shut_down() {
            return Err(SchedulerError::ShutDown);
        }

        let handle = TaskHandle::new();
        let mut tasks = self.tasks.lock();
        tasks.retain(TaskHandle::is_active);
        tasks.push(handle.clone());
        Ok(handle)
    }

    fn rejected(&self, err: SchedulerError) -> TaskHandle {
        warn!(scheduler = %self.config.name, "Rejecting task: {}", err);
        TaskHandle::cancelled_handle()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, task: Task, at: Instant) -> TaskHandle {
        let handle = match self.register() {
            Ok(handle) => handle,
            Err(e) => return self.rejected(e),
        };

        let state = handle.clone();
        let executions = self.executions.clone();
        let log_execution = self.config.log_execution;
        let name = self.config.name.clone();

        self.runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(at) => {}
                _ = state.cancelled() => return,
            }

            if state.is_cancelled() {
                return;
            }

            executions.fetch_add(1, Ordering::Relaxed);
            if log_execution {
                debug!(scheduler = %name, "Executing one-shot task");
            }
            task().await;
            state.mark_done();
        });

        handle
    }

    fn schedule_at_fixed_rate(&self, task: Task, first: Instant, period: Duration) -> TaskHandle {
        let handle = match self.register() {
            Ok(handle) => handle,
            Err(e) => return self.rejected(e),
        };

        let state = handle.clone();
        let executions = self.executions.clone();
        let log_execution = self.config.log_execution;
        let name = self.config.name.clone();

        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(first, period);
            // A slow run pushes the schedule back instead of bursting to catch up.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = state.cancelled() => break,
                }

                if state.is_cancelled() {
                    break;
                }

                executions.fetch_add(1, Ordering::Relaxed);
                if log_execution {
                    debug!(scheduler = %name, "Executing periodic task");
                }
                task().await;
            }
        });

        handle
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("config", &self.config)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
