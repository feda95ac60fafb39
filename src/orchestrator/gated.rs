//! Collaborators that reach their worker through the scheduler.
//!
//! Each call is one unit of work on a slot: the slot is loaded if needed
//! (except for speech), moved to `Busy` for the duration, and holds the
//! accelerator if it is exclusive.

use crate::embedding::Embedder;
use crate::error::{MurmurError, Result};
use crate::generation::{ChatMessage, GenerationParams, Generator};
use crate::perspectives::{Classifier, LabelScore};
use crate::scheduler::{Scheduler, SlotName};
use crate::transcription::Transcriber;
use crate::vision::{Captioner, ImageSource};
use async_trait::async_trait;

/// Reports a slot that could not serve the call as the collaborator's own
/// failure kind.
fn unavailable(kind: fn(String) -> MurmurError) -> impl Fn(MurmurError) -> MurmurError {
    move |e| match e {
        MurmurError::SlotFailed { slot, reason } => {
            kind(format!("{} worker unavailable: {}", slot, reason))
        }
        other => other,
    }
}

/// Embeds through the `Retrieval` slot.
pub struct GatedEmbedder {
    scheduler: Scheduler,
    dimensions: usize,
}

impl GatedEmbedder {
    pub fn new(scheduler: Scheduler, dimensions: usize) -> Self {
        Self {
            scheduler,
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for GatedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.scheduler
            .run(SlotName::Retrieval, |worker| async move {
                worker.embedder()?.embed(text).await
            })
            .await
            .map_err(unavailable(MurmurError::EmbeddingFailed))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Generates through the `Agents` slot.
pub struct GatedGenerator {
    scheduler: Scheduler,
}

impl GatedGenerator {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Generator for GatedGenerator {
    async fn generate(&self, messages: &[ChatMessage], params: &GenerationParams) -> Result<String> {
        self.scheduler
            .run(SlotName::Agents, |worker| async move {
                worker.generator()?.generate(messages, params).await
            })
            .await
            .map_err(unavailable(MurmurError::GenerationFailed))
    }
}

/// Classifies through the `Agents` slot.
pub struct GatedClassifier {
    scheduler: Scheduler,
}

impl GatedClassifier {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Classifier for GatedClassifier {
    async fn classify(&self, text: &str, labels: &[String]) -> Result<Vec<LabelScore>> {
        self.scheduler
            .run(SlotName::Agents, |worker| async move {
                worker.classifier()?.classify(text, labels).await
            })
            .await
            .map_err(unavailable(MurmurError::ClassificationFailed))
    }
}

/// Captions through the `Vision` slot.
pub struct GatedCaptioner {
    scheduler: Scheduler,
}

impl GatedCaptioner {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Captioner for GatedCaptioner {
    async fn caption(&self, image: &ImageSource) -> Result<String> {
        self.scheduler
            .run(SlotName::Vision, |worker| async move {
                worker.captioner()?.caption(image).await
            })
            .await
            .map_err(unavailable(MurmurError::VisionFailed))
    }
}

/// Transcribes through the `Transcription` slot.
///
/// Speech never triggers a load: audio arriving before the recognizer is up
/// is refused with [`MurmurError::AsrNotReady`].
pub struct GatedTranscriber {
    scheduler: Scheduler,
}

impl GatedTranscriber {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Transcriber for GatedTranscriber {
    async fn transcribe(&self, samples: &[f32]) -> Result<String> {
        self.scheduler
            .run_loaded(SlotName::Transcription, |worker| async move {
                worker.transcriber()?.transcribe(samples).await
            })
            .await
            .map_err(|e| match e {
                MurmurError::NotLoaded(_) => MurmurError::AsrNotReady(
                    "the speech recognizer has not finished loading".to_string(),
                ),
                other => other,
            })
    }
}
