// Recording leadership callbacks

use crate::journal::Journal;
use async_trait::async_trait;
use lodestar_distributed::{LeaderError, LeadershipCallbacks};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Callbacks that count invocations and can be told to fail
#[derive(Clone, Default)]
pub struct RecordingCallbacks {
    became: Arc<AtomicUsize>,
    lost: Arc<AtomicUsize>,
    fail_became: Arc<AtomicBool>,
    fail_lost: Arc<AtomicBool>,
    journal: Journal,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `became_leader` / `lost_leadership` events into `journal`
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    /// Make `on_became_leader` return an error
    pub fn fail_became_leader(&self, fail: bool) {
        self.fail_became.store(fail, Ordering::SeqCst);
    }

    /// Make `on_lost_leadership` return an error
    pub fn fail_lost_leadership(&self, fail: bool) {
        self.fail_lost.store(fail, Ordering::SeqCst);
    }

    pub fn became_leader_calls(&self) -> usize {
        self.became.load(Ordering::SeqCst)
    }

    pub fn lost_leadership_calls(&self) -> usize {
        self.lost.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeadershipCallbacks for RecordingCallbacks {
    async fn on_became_leader(&self) -> Result<(), LeaderError> {
        self.became.fetch_add(1, Ordering::SeqCst);
        self.journal.record("became_leader");

        if self.fail_became.load(Ordering::SeqCst) {
            return Err(LeaderError::Callback("scripted failure".to_string()));
        }
        Ok(())
    }

    async fn on_lost_leadership(&self) -> Result<(), LeaderError> {
        self.lost.fetch_add(1, Ordering::SeqCst);
        self.journal.record("lost_leadership");

        if self.fail_lost.load(Ordering::SeqCst) {
            return Err(LeaderError::Callback("scripted failure".to_string()));
        }
        Ok(())
    }
}
