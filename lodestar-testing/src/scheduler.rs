// Manually driven scheduler

use lodestar_scheduler::{Scheduler, Task, TaskHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Kind of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Once,
    FixedRate,
}

struct Entry {
    id: usize,
    kind: TaskKind,
    task: Task,
    due: Instant,
    period: Option<Duration>,
    handle: TaskHandle,
    runs: usize,
}

/// Snapshot of one scheduled task
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: usize,
    pub kind: TaskKind,
    pub due: Instant,
    pub period: Option<Duration>,
    pub runs: usize,
    pub handle: TaskHandle,
}

/// Scheduler that records submissions and only runs them when told to.
///
/// Time never advances by itself; `run_*` methods pick tasks regardless of
/// their due instant, in due order.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl ManualScheduler {
    /// Create a new scheduler
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, kind: TaskKind, task: Task, due: Instant, period: Option<Duration>) -> TaskHandle {
        let handle = TaskHandle::new();
        let mut entries = self.entries.lock();
        let id = entries.len();
        entries.push(Entry {
            id,
            kind,
            task,
            due,
            period,
            handle: handle.clone(),
            runs: 0,
        });
        handle
    }

    /// Every task ever scheduled, in submission order
    pub fn tasks(&self) -> Vec<ScheduledTask> {
        self.entries
            .lock()
            .iter()
            .map(|entry| ScheduledTask {
                id: entry.id,
                kind: entry.kind,
                due: entry.due,
                period: entry.period,
                runs: entry.runs,
                handle: entry.handle.clone(),
            })
            .collect()
    }

    /// Tasks of `kind` that are neither cancelled nor finished
    pub fn active(&self, kind: TaskKind) -> Vec<ScheduledTask> {
        self.tasks()
            .into_iter()
            .filter(|task| task.kind == kind && task.handle.is_active())
            .collect()
    }

    /// Number of fixed-rate tasks ever scheduled
    pub fn fixed_rate_count(&self) -> usize {
        self.tasks()
            .iter()
            .filter(|task| task.kind == TaskKind::FixedRate)
            .count()
    }

    fn take_next(&self, kind: TaskKind) -> Option<(Task, TaskHandle)> {
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .filter(|entry| entry.kind == kind && entry.handle.is_active())
            .min_by_key(|entry| (entry.due, entry.id))?;

        entry.runs += 1;
        if let Some(period) = entry.period {
            entry.due += period;
        }
        Some((entry.task.clone(), entry.handle.clone()))
    }

    /// Run the earliest active one-shot task. Returns `false` when there is none.
    pub async fn run_next_once(&self) -> bool {
        let Some((task, handle)) = self.take_next(TaskKind::Once) else {
            return false;
        };

        handle.mark_done();
        task().await;
        true
    }

    /// Run one-shot tasks until none are left, including ones scheduled
    /// along the way. Stops after `limit` runs; returns how many ran.
    pub async fn run_once_tasks(&self, limit: usize) -> usize {
        let mut ran = 0;
        while ran < limit && self.run_next_once().await {
            ran += 1;
        }
        ran
    }

    /// Run one tick of the earliest active fixed-rate task.
    pub async fn tick(&self) -> bool {
        let Some((task, _handle)) = self.take_next(TaskKind::FixedRate) else {
            return false;
        };

        task().await;
        true
    }

    /// Cancel everything still outstanding
    pub fn cancel_all(&self) {
        for entry in self.entries.lock().iter() {
            entry.handle.cancel();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, task: Task, at: Instant) -> TaskHandle {
        self.push(TaskKind::Once, task, at, None)
    }

    fn schedule_at_fixed_rate(&self, task: Task, first: Instant, period: Duration) -> TaskHandle {
        self.push(TaskKind::FixedRate, task, first, Some(period))
    }
}
