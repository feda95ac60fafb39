//! Orchestrator for Murmur.
//!
//! Owns the worker scheduler, the retrieval pipeline and the transcript
//! buffer, and wires every inference consumer through the scheduler so the
//! CLI only has to talk to one object.

mod document;
mod gated;
mod loader;

pub use document::{join_pages, load_document};
pub use gated::{GatedCaptioner, GatedClassifier, GatedEmbedder, GatedGenerator, GatedTranscriber};
pub use loader::DefaultLoader;

use crate::config::{Prompts, Settings};
use crate::error::{MurmurError, Result};
use crate::generation::Generator;
use crate::perspectives::{
    assistant_messages, assistant_params, candidate_labels, pick, AssistantReply, Classifier,
};
use crate::rag::{Answer, ChatSession, RagPipeline, RetrievalOptions};
use crate::scheduler::{RestoreOutcome, Scheduler, SlotStatus, WorkerLoader};
use crate::transcription::{Transcriber, TranscriptBuffer, Utterance};
use crate::vector_store::{IndexEvent, QueryHit};
use crate::vision::{audit_messages, audit_params, clean_caption, Captioner, ImageSource, UxAudit};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument};

/// The main orchestrator.
pub struct Orchestrator {
    settings: Settings,
    prompts: Prompts,
    scheduler: Scheduler,
    pipeline: RagPipeline,
    generator: Arc<dyn Generator>,
    classifier: Arc<dyn Classifier>,
    captioner: Arc<dyn Captioner>,
    transcriber: Arc<dyn Transcriber>,
    transcript: Mutex<TranscriptBuffer>,
}

impl Orchestrator {
    /// Create an orchestrator for the configured backends.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;
        let loader = Arc::new(DefaultLoader::new(settings.clone(), prompts.clone()));
        Ok(Self::with_loader(settings, prompts, loader))
    }

    /// Create an orchestrator with a custom worker loader.
    pub fn with_loader(settings: Settings, prompts: Prompts, loader: Arc<dyn WorkerLoader>) -> Self {
        let scheduler = Scheduler::new(
            settings.scheduler.slots.clone(),
            loader,
            settings.scheduler.to_config(),
        );

        let embedder = Arc::new(GatedEmbedder::new(
            scheduler.clone(),
            settings.embedding.dimensions,
        ));
        let generator: Arc<dyn Generator> = Arc::new(GatedGenerator::new(scheduler.clone()));

        let pipeline = RagPipeline::new(embedder, Arc::clone(&generator))
            .with_chunking(settings.chunking.to_config())
            .with_options(RetrievalOptions::from(&settings.retrieval))
            .with_prompts(prompts.clone())
            .with_params(settings.generation.params.clone());

        Self {
            classifier: Arc::new(GatedClassifier::new(scheduler.clone())),
            captioner: Arc::new(GatedCaptioner::new(scheduler.clone())),
            transcriber: Arc::new(GatedTranscriber::new(scheduler.clone())),
            transcript: Mutex::new(TranscriptBuffer::new(settings.transcription.window)),
            generator,
            pipeline,
            scheduler,
            prompts,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }

    /// Bring up every autostart slot, light ones first.
    pub async fn start(&self) -> RestoreOutcome {
        self.scheduler.start_all().await
    }

    /// Tear down every worker.
    pub async fn shutdown(&self) -> Result<()> {
        self.scheduler.suspend_all().await
    }

    /// Slot states for display.
    pub fn slots(&self) -> Vec<SlotStatus> {
        self.scheduler.snapshot()
    }

    /// Index a document, replacing the current one.
    pub async fn index_document(
        &self,
        text: &str,
        progress: Option<&UnboundedSender<IndexEvent>>,
    ) -> Result<usize> {
        self.pipeline.start_indexing(text, progress).await
    }

    /// Retrieve passages without generating.
    pub async fn search(&self, question: &str, top_k: Option<usize>) -> Result<Vec<QueryHit>> {
        self.pipeline
            .retrieve(question, top_k.unwrap_or(self.settings.retrieval.top_k))
            .await
    }

    /// Answer a question about the indexed document.
    ///
    /// With `exclusive_generation` every other worker is torn down for the
    /// duration and restored in the background afterwards.
    #[instrument(skip(self, question))]
    pub async fn ask(&self, question: &str, top_k: Option<usize>) -> Result<Answer> {
        let top_k = top_k.unwrap_or(self.settings.retrieval.top_k);
        if self.settings.retrieval.exclusive_generation && self.pipeline.is_indexed() {
            debug!("Answering with exclusive access to the accelerator");
            self.scheduler
                .exclusive(|| self.pipeline.answer(question, top_k))
                .await
        } else {
            self.pipeline.answer(question, top_k).await
        }
    }

    /// One turn of a conversation about the indexed document.
    pub async fn chat(
        &self,
        session: &mut ChatSession,
        message: &str,
        top_k: Option<usize>,
    ) -> Result<Answer> {
        let top_k = top_k.unwrap_or(self.settings.retrieval.top_k);
        self.pipeline.chat(session, message, top_k).await
    }

    fn transcript(&self) -> MutexGuard<'_, TranscriptBuffer> {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recognize an utterance and add it to the transcript.
    ///
    /// Returns `None` when the recognizer heard nothing.
    pub async fn transcribe(&self, samples: &[f32]) -> Result<Option<Utterance>> {
        let text = self.transcriber.transcribe(samples).await?;
        Ok(self.transcript().push(&text).cloned())
    }

    /// Add already-recognized text to the transcript.
    pub fn push_utterance(&self, text: &str) -> Option<Utterance> {
        self.transcript().push(text).cloned()
    }

    /// The assistant's current view of the conversation.
    pub fn transcript_context(&self) -> String {
        self.transcript().context_text()
    }

    /// Every utterance recorded so far.
    pub fn transcript_history(&self) -> Vec<Utterance> {
        self.transcript().history().to_vec()
    }

    /// React to the conversation from the best-fitting perspective.
    ///
    /// Uses `text` when given, the transcript window otherwise.
    #[instrument(skip_all)]
    pub async fn assist(&self, text: Option<&str>) -> Result<AssistantReply> {
        let text = match text {
            Some(text) => text.trim().to_string(),
            None => self.transcript_context(),
        };
        if text.is_empty() {
            return Err(MurmurError::InvalidParameter(
                "nothing has been said yet".to_string(),
            ));
        }

        let scores = self.classifier.classify(&text, &candidate_labels()).await?;
        let perspective = pick(&scores)?;
        info!("Responding from the {} perspective", perspective);

        let messages = assistant_messages(&self.prompts.assistant, perspective, &text);
        let response = self.generator.generate(&messages, &assistant_params()).await?;

        Ok(AssistantReply {
            perspective,
            scores,
            response: response.trim().to_string(),
        })
    }

    /// Caption an interface screenshot and ask for improvements.
    #[instrument(skip(self, question), fields(image = %image))]
    pub async fn audit(&self, image: &ImageSource, question: Option<&str>) -> Result<UxAudit> {
        let caption = self.captioner.caption(image).await?;
        let description = clean_caption(&caption);
        if description.is_empty() {
            return Err(MurmurError::VisionFailed(
                "the captioner returned an empty description".to_string(),
            ));
        }
        debug!("Caption: {}", description);

        let messages = audit_messages(&self.prompts.audit, &description, question);
        let advice = self.generator.generate(&messages, &audit_params()).await?;
        Ok(UxAudit::new(description, &advice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::generation::ExtractiveGenerator;
    use crate::perspectives::{EmbeddingClassifier, Perspective};
    use crate::scheduler::{LoadReporter, SlotName, SlotState, Worker};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const DOC: &str = "The council approved the river budget in March. \
Flood barriers will be built along the east bank. \
The library reopens next spring with longer hours.";

    struct EchoTranscriber;

    #[async_trait]
    impl Transcriber for EchoTranscriber {
        async fn transcribe(&self, samples: &[f32]) -> Result<String> {
            Ok(format!("heard {} samples", samples.len()))
        }
    }

    struct FixedCaptioner;

    #[async_trait]
    impl Captioner for FixedCaptioner {
        async fn caption(&self, _image: &ImageSource) -> Result<String> {
            Ok("<s>A login form with a tiny grey submit button.</s>".to_string())
        }
    }

    #[derive(Default)]
    struct FakeLoader {
        loads: AtomicUsize,
        broken: Option<SlotName>,
        slow: Option<(SlotName, Duration)>,
    }

    #[async_trait]
    impl WorkerLoader for FakeLoader {
        async fn load(&self, slot: SlotName, _progress: &LoadReporter) -> Result<Worker> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some((_, delay)) = self.slow.filter(|(s, _)| *s == slot) {
                tokio::time::sleep(delay).await;
            }
            if self.broken == Some(slot) {
                return Err(MurmurError::Config(format!("no weights for {}", slot)));
            }
            let embedder = Arc::new(HashingEmbedder::new());
            Ok(match slot {
                SlotName::Transcription => Worker::Transcription(Arc::new(EchoTranscriber)),
                SlotName::Agents => Worker::Agents {
                    classifier: Arc::new(EmbeddingClassifier::new(embedder)),
                    generator: Arc::new(ExtractiveGenerator::new()),
                },
                SlotName::Vision => Worker::Vision(Arc::new(FixedCaptioner)),
                SlotName::Retrieval => Worker::Retrieval(embedder),
            })
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.scheduler.settle_delay_ms = 5;
        settings.scheduler.quiescence_timeout_ms = 2_000;
        settings.chunking.chunk_size = 60;
        settings.chunking.overlap = 10;
        settings
    }

    fn orchestrator(settings: Settings) -> (Orchestrator, Arc<FakeLoader>) {
        with_loader(settings, FakeLoader::default())
    }

    fn with_loader(settings: Settings, loader: FakeLoader) -> (Orchestrator, Arc<FakeLoader>) {
        let loader = Arc::new(loader);
        let orchestrator = Orchestrator::with_loader(settings, Prompts::default(), loader.clone());
        (orchestrator, loader)
    }

    #[tokio::test]
    async fn test_ask_before_indexing_loads_nothing() {
        let (orch, loader) = orchestrator(settings());
        assert!(matches!(
            orch.ask("What was approved?", None).await,
            Err(MurmurError::NotIndexed)
        ));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
        assert!(orch
            .slots()
            .iter()
            .all(|s| s.state == SlotState::Unloaded));
    }

    #[tokio::test]
    async fn test_index_and_ask_through_slots() {
        let (orch, _loader) = orchestrator(settings());
        let chunks = orch.index_document(DOC, None).await.unwrap();
        assert!(chunks > 1);
        assert_eq!(
            orch.scheduler().state(SlotName::Retrieval),
            Some(SlotState::Ready)
        );

        let answer = orch.ask("When was the budget approved?", Some(2)).await.unwrap();
        assert!(!answer.text.is_empty());
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(orch.scheduler().state(SlotName::Agents), Some(SlotState::Ready));
        assert_eq!(orch.scheduler().accelerator_holder(), None);

        let hits = orch.search("library", Some(1)).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_exclusive_generation_answers() {
        let mut settings = settings();
        settings.retrieval.exclusive_generation = true;
        let (orch, _loader) = orchestrator(settings);
        orch.index_document(DOC, None).await.unwrap();

        let answer = orch.ask("What reopens?", Some(1)).await.unwrap();
        assert_eq!(answer.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_broken_generator_slot_is_a_generation_failure() {
        let loader = FakeLoader {
            broken: Some(SlotName::Agents),
            ..Default::default()
        };
        let (orch, _loader) = with_loader(settings(), loader);
        orch.index_document(DOC, None).await.unwrap();

        let err = orch.ask("What reopens?", Some(1)).await.unwrap_err();
        assert!(matches!(err, MurmurError::GenerationFailed(ref m) if m.contains("no weights")));
        assert_eq!(orch.scheduler().state(SlotName::Agents), Some(SlotState::Error));
        // The index survives and retrieval still works.
        assert!(orch.pipeline().is_indexed());
        assert_eq!(orch.search("library", Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_broken_embedder_slot_is_an_embedding_failure() {
        let loader = FakeLoader {
            broken: Some(SlotName::Retrieval),
            ..Default::default()
        };
        let (orch, _loader) = with_loader(settings(), loader);

        let err = orch.index_document(DOC, None).await.unwrap_err();
        assert!(matches!(err, MurmurError::EmbeddingFailed(_)));
        assert!(!orch.pipeline().is_indexed());
        assert!(orch.pipeline().last_failure().is_some());
    }

    #[tokio::test]
    async fn test_suspend_supersedes_answer_and_restore() {
        let loader = FakeLoader {
            slow: Some((SlotName::Agents, Duration::from_millis(100))),
            ..Default::default()
        };
        let (orch, _loader) = with_loader(settings(), loader);
        let orch = Arc::new(orch);
        orch.index_document(DOC, None).await.unwrap();

        let asking = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.ask("What reopens?", Some(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(orch.scheduler().state(SlotName::Agents), Some(SlotState::Loading));

        orch.shutdown().await.unwrap();
        assert!(matches!(asking.await.unwrap(), Err(MurmurError::Cancelled)));
        assert!(orch.pipeline().is_indexed());
        assert_eq!(orch.pipeline().state(), crate::rag::PipelineState::Indexed);
        assert_eq!(
            orch.scheduler().suspended(),
            vec![SlotName::Agents, SlotName::Retrieval]
        );

        // Retrieval comes back first; tear down again while Agents loads.
        let restore = orch.scheduler().restore_in_background();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(orch.scheduler().state(SlotName::Retrieval), Some(SlotState::Ready));
        assert_eq!(orch.scheduler().state(SlotName::Agents), Some(SlotState::Loading));
        orch.shutdown().await.unwrap();

        assert_eq!(restore.await.unwrap(), RestoreOutcome::Aborted);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(orch.slots().iter().all(|s| s.state == SlotState::Unloaded));
        assert_eq!(orch.scheduler().accelerator_holder(), None);
    }

    #[tokio::test]
    async fn test_speech_requires_loaded_recognizer() {
        let (orch, _loader) = orchestrator(settings());
        assert!(matches!(
            orch.transcribe(&[0.0; 160]).await,
            Err(MurmurError::AsrNotReady(_))
        ));
        assert_eq!(
            orch.scheduler().state(SlotName::Transcription),
            Some(SlotState::Unloaded)
        );

        orch.scheduler()
            .ensure_loaded(SlotName::Transcription)
            .await
            .unwrap();
        let utterance = orch.transcribe(&[0.0; 160]).await.unwrap().unwrap();
        assert_eq!(utterance.text, "heard 160 samples");
        assert_eq!(orch.transcript_context(), "heard 160 samples");
        assert_eq!(orch.transcript_history().len(), 1);
    }

    #[tokio::test]
    async fn test_assist_uses_transcript_window() {
        let (orch, _loader) = orchestrator(settings());
        assert!(matches!(
            orch.assist(None).await,
            Err(MurmurError::InvalidParameter(_))
        ));

        orch.push_utterance("I am worried the launch could fail.");
        orch.push_utterance("What happens if the servers go down?");
        let reply = orch.assist(None).await.unwrap();

        assert!(Perspective::ALL.contains(&reply.perspective));
        assert_eq!(reply.scores.len(), Perspective::ALL.len());
        assert!(!reply.response.is_empty());
    }

    #[tokio::test]
    async fn test_audit_cleans_caption() {
        let (orch, _loader) = orchestrator(settings());
        let audit = orch
            .audit(&ImageSource::parse("https://example.com/ui.png"), None)
            .await
            .unwrap();
        assert_eq!(
            audit.description,
            "A login form with a tiny grey submit button."
        );
        assert!(audit.report.starts_with("VISUAL ANALYSIS\n"));
        assert!(audit.report.contains("RECOMMENDATIONS\n"));
        assert_eq!(orch.scheduler().state(SlotName::Vision), Some(SlotState::Ready));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let (orch, loader) = orchestrator(settings());
        assert!(matches!(
            orch.start().await,
            RestoreOutcome::Completed { ref failed } if failed.is_empty()
        ));
        assert_eq!(loader.loads.load(Ordering::SeqCst), SlotName::ALL.len());
        assert!(orch.slots().iter().all(|s| s.state == SlotState::Ready));

        orch.shutdown().await.unwrap();
        assert!(orch.slots().iter().all(|s| s.state == SlotState::Unloaded));
    }
}
