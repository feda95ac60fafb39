//! Worker handles and the loader seam.

use super::{SchedulerEvent, SlotName};
use crate::embedding::Embedder;
use crate::error::{MurmurError, Result};
use crate::generation::Generator;
use crate::perspectives::Classifier;
use crate::transcription::Transcriber;
use crate::vision::Captioner;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A loaded worker. Cloning shares the underlying collaborators.
#[derive(Clone)]
pub enum Worker {
    Transcription(Arc<dyn Transcriber>),
    Agents {
        classifier: Arc<dyn Classifier>,
        generator: Arc<dyn Generator>,
    },
    Vision(Arc<dyn Captioner>),
    Retrieval(Arc<dyn Embedder>),
}

impl Worker {
    /// The slot this worker is meant for.
    pub fn slot(&self) -> SlotName {
        match self {
            Worker::Transcription(_) => SlotName::Transcription,
            Worker::Agents { .. } => SlotName::Agents,
            Worker::Vision(_) => SlotName::Vision,
            Worker::Retrieval(_) => SlotName::Retrieval,
        }
    }

    pub fn transcriber(&self) -> Result<Arc<dyn Transcriber>> {
        match self {
            Worker::Transcription(t) => Ok(Arc::clone(t)),
            other => Err(other.mismatch(SlotName::Transcription)),
        }
    }

    pub fn generator(&self) -> Result<Arc<dyn Generator>> {
        match self {
            Worker::Agents { generator, .. } => Ok(Arc::clone(generator)),
            other => Err(other.mismatch(SlotName::Agents)),
        }
    }

    pub fn classifier(&self) -> Result<Arc<dyn Classifier>> {
        match self {
            Worker::Agents { classifier, .. } => Ok(Arc::clone(classifier)),
            other => Err(other.mismatch(SlotName::Agents)),
        }
    }

    pub fn captioner(&self) -> Result<Arc<dyn Captioner>> {
        match self {
            Worker::Vision(c) => Ok(Arc::clone(c)),
            other => Err(other.mismatch(SlotName::Vision)),
        }
    }

    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        match self {
            Worker::Retrieval(e) => Ok(Arc::clone(e)),
            other => Err(other.mismatch(SlotName::Retrieval)),
        }
    }

    fn mismatch(&self, wanted: SlotName) -> MurmurError {
        MurmurError::SlotFailed {
            slot: self.slot(),
            reason: format!("worker cannot serve the {} slot", wanted),
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Worker({})", self.slot())
    }
}

/// Reports loading progress for one slot to scheduler subscribers.
#[derive(Debug, Clone)]
pub struct LoadReporter {
    slot: SlotName,
    events: broadcast::Sender<SchedulerEvent>,
}

impl LoadReporter {
    pub(crate) fn new(slot: SlotName, events: broadcast::Sender<SchedulerEvent>) -> Self {
        Self { slot, events }
    }

    pub fn slot(&self) -> SlotName {
        self.slot
    }

    pub fn report(&self, stage: impl Into<String>, done: u64, total: u64) {
        // Nobody listening is fine.
        let _ = self.events.send(SchedulerEvent::LoadProgress {
            slot: self.slot,
            stage: stage.into(),
            done,
            total,
        });
    }
}

/// Creates and disposes of workers. The scheduler decides when.
#[async_trait]
pub trait WorkerLoader: Send + Sync {
    /// Build the worker for `slot`.
    async fn load(&self, slot: SlotName, progress: &LoadReporter) -> Result<Worker>;

    /// Release a worker's resources.
    async fn unload(&self, slot: SlotName, worker: Worker) {
        let _ = slot;
        drop(worker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    #[test]
    fn test_accessors_match_variant() {
        let worker = Worker::Retrieval(Arc::new(HashingEmbedder::new()));
        assert_eq!(worker.slot(), SlotName::Retrieval);
        assert!(worker.embedder().is_ok());
        assert!(matches!(
            worker.generator(),
            Err(MurmurError::SlotFailed {
                slot: SlotName::Retrieval,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_reporter_publishes_progress() {
        let (tx, mut rx) = broadcast::channel(4);
        let reporter = LoadReporter::new(SlotName::Vision, tx);
        reporter.report("weights", 1, 2);
        match rx.recv().await.unwrap() {
            SchedulerEvent::LoadProgress { slot, done, total, .. } => {
                assert_eq!(slot, SlotName::Vision);
                assert_eq!((done, total), (1, 2));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
