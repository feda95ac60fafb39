//! Builds workers from settings.

use crate::config::{EmbeddingProvider, GenerationProvider, Prompts, Settings};
use crate::embedding::{Embedder, HashingEmbedder, OpenAIEmbedder};
use crate::error::Result;
use crate::generation::{ExtractiveGenerator, Generator, OpenAIGenerator};
use crate::perspectives::EmbeddingClassifier;
use crate::scheduler::{LoadReporter, SlotName, Worker, WorkerLoader};
use crate::transcription::OpenAITranscriber;
use crate::vision::OpenAICaptioner;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Loader for the configured backends.
pub struct DefaultLoader {
    settings: Settings,
    prompts: Prompts,
}

impl DefaultLoader {
    pub fn new(settings: Settings, prompts: Prompts) -> Self {
        Self { settings, prompts }
    }

    fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        let embedding = &self.settings.embedding;
        Ok(match embedding.provider {
            EmbeddingProvider::Hash => Arc::new(HashingEmbedder::with_dimensions(embedding.dimensions)),
            EmbeddingProvider::OpenAI => Arc::new(OpenAIEmbedder::with_config(
                &self.settings.endpoint(embedding.base_url.as_ref()),
                &embedding.model,
                embedding.dimensions,
            )?),
        })
    }

    fn generator(&self) -> Result<Arc<dyn Generator>> {
        let generation = &self.settings.generation;
        Ok(match generation.provider {
            GenerationProvider::Extractive => Arc::new(ExtractiveGenerator::new()),
            GenerationProvider::OpenAI => Arc::new(OpenAIGenerator::with_config(
                &self.settings.endpoint(generation.base_url.as_ref()),
                &generation.model,
            )?),
        })
    }
}

#[async_trait]
impl WorkerLoader for DefaultLoader {
    async fn load(&self, slot: SlotName, progress: &LoadReporter) -> Result<Worker> {
        info!("Loading {} worker", slot);
        let worker = match slot {
            SlotName::Retrieval => {
                progress.report("embedder", 0, 1);
                let worker = Worker::Retrieval(self.embedder()?);
                progress.report("embedder", 1, 1);
                worker
            }
            SlotName::Agents => {
                // The classifier gets its own embedder so that classifying
                // never waits on the retrieval slot.
                progress.report("classifier", 0, 2);
                let classifier = EmbeddingClassifier::new(self.embedder()?)
                    .with_hypothesis(&self.prompts.assistant.hypothesis_template);
                progress.report("generator", 1, 2);
                let generator = self.generator()?;
                progress.report("generator", 2, 2);
                Worker::Agents {
                    classifier: Arc::new(classifier),
                    generator,
                }
            }
            SlotName::Transcription => {
                let transcription = &self.settings.transcription;
                progress.report("recognizer", 0, 1);
                let transcriber = OpenAITranscriber::with_config(
                    &self.settings.endpoint(transcription.base_url.as_ref()),
                    &transcription.model,
                    transcription.language.as_deref(),
                )?;
                progress.report("recognizer", 1, 1);
                Worker::Transcription(Arc::new(transcriber))
            }
            SlotName::Vision => {
                let vision = &self.settings.vision;
                progress.report("captioner", 0, 1);
                let captioner = OpenAICaptioner::with_config(
                    &self.settings.endpoint(vision.base_url.as_ref()),
                    &vision.model,
                    vision.max_tokens,
                )?;
                progress.report("captioner", 1, 1);
                Worker::Vision(Arc::new(captioner))
            }
        };
        debug!("{} worker ready", slot);
        Ok(worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerEvent;
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn test_offline_defaults_load() {
        let loader = DefaultLoader::new(Settings::default(), Prompts::default());
        let (tx, mut rx) = broadcast::channel(16);
        let reporter = LoadReporter::new(SlotName::Agents, tx);

        let worker = loader.load(SlotName::Agents, &reporter).await.unwrap();
        assert_eq!(worker.slot(), SlotName::Agents);
        assert!(worker.generator().is_ok());
        assert!(worker.classifier().is_ok());

        let mut stages = Vec::new();
        while let Ok(SchedulerEvent::LoadProgress { stage, .. }) = rx.try_recv() {
            stages.push(stage);
        }
        assert_eq!(stages, vec!["classifier", "generator", "generator"]);
    }

    #[tokio::test]
    async fn test_retrieval_uses_configured_dimensions() {
        let mut settings = Settings::default();
        settings.embedding.dimensions = 64;
        let loader = DefaultLoader::new(settings, Prompts::default());
        let (tx, _rx) = broadcast::channel(4);
        let worker = loader
            .load(SlotName::Retrieval, &LoadReporter::new(SlotName::Retrieval, tx))
            .await
            .unwrap();
        assert_eq!(worker.embedder().unwrap().dimensions(), 64);
    }
}
