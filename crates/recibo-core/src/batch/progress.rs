//! Batch progress tracking and cancellation.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::models::batch::FileStage;

/// Point-in-time view of a running batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub total: usize,
    /// Files in a terminal stage.
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Stage of each file, in input order.
    pub stages: Vec<FileStage>,
}

impl BatchProgress {
    pub fn is_finished(&self) -> bool {
        self.processed == self.total
    }
}

/// Owner of the batch progress. Clones share the same state.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    tx: Arc<watch::Sender<BatchProgress>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BatchProgress::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn snapshot(&self) -> BatchProgress {
        self.tx.borrow().clone()
    }

    /// Receive every update from now on.
    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.tx.subscribe()
    }

    /// Start tracking a new batch of `total` pending files.
    pub(crate) fn reset(&self, total: usize) {
        self.tx.send_replace(BatchProgress {
            total,
            stages: vec![FileStage::Pending; total],
            ..BatchProgress::default()
        });
    }

    /// Move file `index` to `stage`. Terminal stages are final.
    pub(crate) fn set_stage(&self, index: usize, stage: FileStage) {
        self.tx.send_modify(|progress| {
            let Some(slot) = progress.stages.get_mut(index) else {
                return;
            };
            if slot.is_terminal() {
                return;
            }
            match stage {
                FileStage::Done => {
                    progress.processed += 1;
                    progress.succeeded += 1;
                }
                FileStage::Failed(_) => {
                    progress.processed += 1;
                    progress.failed += 1;
                }
                _ => {}
            }
            *slot = stage;
        });
    }
}

/// Cooperative cancellation for a running batch. Clones share the same signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only ends on cancellation.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
