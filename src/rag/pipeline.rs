//! Document indexing and question answering.

use super::context::{build_context, render_query};
use super::response::{Answer, ChatSession};
use crate::chunking::ChunkingConfig;
use crate::config::{Prompts, RetrievalSettings};
use crate::embedding::Embedder;
use crate::error::{MurmurError, Result};
use crate::generation::{ChatMessage, GenerationParams, Generator};
use crate::vector_store::{notify, IndexEvent, IndexSnapshot, QueryHit, VectorStore};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Where the pipeline is in its document lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Indexing,
    Indexed,
    Querying,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Indexing => "indexing",
            PipelineState::Indexed => "indexed",
            PipelineState::Querying => "querying",
            PipelineState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Retrieval knobs that shape the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOptions {
    pub context_chunks: usize,
    pub max_context_chars: usize,
    pub min_score: Option<f32>,
    pub query_template: String,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self::from(&RetrievalSettings::default())
    }
}

impl From<&RetrievalSettings> for RetrievalOptions {
    fn from(settings: &RetrievalSettings) -> Self {
        Self {
            context_chunks: settings.context_chunks,
            max_context_chars: settings.max_context_chars,
            min_score: settings.min_score,
            query_template: settings.query_template.clone(),
        }
    }
}

#[derive(Debug)]
struct Status {
    state: PipelineState,
    /// Id of the most recent indexing job. Only that job may commit.
    job: u64,
    cancel: Option<CancellationToken>,
    last_failure: Option<String>,
}

/// Retrieval-augmented QA over one indexed document.
pub struct RagPipeline {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    chunking: ChunkingConfig,
    options: RetrievalOptions,
    prompts: Prompts,
    params: GenerationParams,
    status: Mutex<Status>,
}

impl RagPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> Self {
        Self {
            store: VectorStore::new(),
            embedder,
            generator,
            chunking: ChunkingConfig::default(),
            options: RetrievalOptions::default(),
            prompts: Prompts::default(),
            params: GenerationParams::default(),
            status: Mutex::new(Status {
                state: PipelineState::Idle,
                job: 0,
                cancel: None,
                last_failure: None,
            }),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_options(mut self, options: RetrievalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> PipelineState {
        self.status().state
    }

    /// Message of the most recent indexing or query failure.
    pub fn last_failure(&self) -> Option<String> {
        self.status().last_failure.clone()
    }

    /// The committed index.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.store.snapshot()
    }

    pub fn is_indexed(&self) -> bool {
        !self.store.is_empty()
    }

    /// Chunk, embed and commit a document, replacing the current index.
    ///
    /// Chunking happens up front, so an empty document or bad chunk
    /// parameters fail before any embedding is requested. Starting a new job
    /// cancels the one in flight; the superseded job returns
    /// [`MurmurError::Cancelled`] and never commits. On failure the previous
    /// index stays queryable.
    #[instrument(skip_all, fields(chars = raw_text.len()))]
    pub async fn start_indexing(
        &self,
        raw_text: &str,
        progress: Option<&UnboundedSender<IndexEvent>>,
    ) -> Result<usize> {
        let chunks = self.chunking.apply(raw_text)?;
        if chunks.is_empty() {
            return Err(MurmurError::EmptyDocument);
        }

        let (job, cancel) = {
            let mut status = self.status();
            if let Some(previous) = status.cancel.take() {
                debug!("Cancelling indexing job {}", status.job);
                previous.cancel();
            }
            status.job += 1;
            status.state = PipelineState::Indexing;
            let token = CancellationToken::new();
            status.cancel = Some(token.clone());
            (status.job, token)
        };

        notify(
            progress,
            IndexEvent::Status(format!("Split document into {} chunks", chunks.len())),
        );

        let built = VectorStore::build(chunks, self.embedder.as_ref(), progress, &cancel).await;

        let mut status = self.status();
        if status.job != job {
            debug!("Indexing job {} was superseded", job);
            return Err(MurmurError::Cancelled);
        }
        status.cancel = None;

        match built {
            Ok(snapshot) => {
                let count = snapshot.len();
                self.store.commit(snapshot);
                status.state = PipelineState::Indexed;
                status.last_failure = None;
                drop(status);
                info!("Indexed {} chunks", count);
                notify(progress, IndexEvent::Done { chunks: count });
                Ok(count)
            }
            Err(MurmurError::Cancelled) => {
                status.state = if self.store.is_empty() {
                    PipelineState::Idle
                } else {
                    PipelineState::Indexed
                };
                Err(MurmurError::Cancelled)
            }
            Err(e) => {
                warn!("Indexing failed: {}", e);
                status.state = PipelineState::Failed;
                status.last_failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Cancel the indexing job in flight, if any.
    pub fn cancel_indexing(&self) {
        if let Some(token) = self.status().cancel.as_ref() {
            token.cancel();
        }
    }

    /// Drop the committed index.
    ///
    /// Any indexing job still running is disowned and will not commit.
    pub fn reset(&self) {
        let mut status = self.status();
        if let Some(token) = status.cancel.take() {
            token.cancel();
        }
        status.job += 1;
        self.store.clear();
        status.state = PipelineState::Idle;
        status.last_failure = None;
    }

    /// Rank committed chunks against a question without generating.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<QueryHit>> {
        check_request(question, top_k)?;
        if self.store.is_empty() {
            return Err(MurmurError::NotIndexed);
        }
        self.search(question, top_k).await
    }

    /// Answer a question from the committed index.
    #[instrument(skip(self, question))]
    pub async fn answer(&self, question: &str, top_k: usize) -> Result<Answer> {
        check_request(question, top_k)?;
        if self.store.is_empty() {
            return Err(MurmurError::NotIndexed);
        }

        self.enter_query();
        let result = self.answer_with(question, top_k, None).await;
        self.leave_query(&result);
        result
    }

    /// Answer a question with conversation history.
    ///
    /// Each turn retrieves fresh passages; the session keeps the exchange
    /// for follow-ups.
    pub async fn chat(&self, session: &mut ChatSession, message: &str, top_k: usize) -> Result<Answer> {
        check_request(message, top_k)?;
        if self.store.is_empty() {
            return Err(MurmurError::NotIndexed);
        }

        self.enter_query();
        let result = self.answer_with(message, top_k, Some(session.history())).await;
        self.leave_query(&result);

        let answer = result?;
        session.record(
            ChatMessage::user(message.trim()),
            ChatMessage::assistant(answer.text.clone()),
        );
        Ok(answer)
    }

    async fn search(&self, question: &str, top_k: usize) -> Result<Vec<QueryHit>> {
        let query = render_query(&self.options.query_template, question);
        let mut hits = self.store.query(&query, self.embedder.as_ref(), top_k).await?;
        if let Some(min) = self.options.min_score {
            hits.retain(|hit| hit.score >= min);
        }
        Ok(hits)
    }

    async fn answer_with(
        &self,
        question: &str,
        top_k: usize,
        history: Option<&[ChatMessage]>,
    ) -> Result<Answer> {
        let hits = self.search(question, top_k).await?;
        if hits.is_empty() {
            debug!("No passage cleared the score threshold");
            return Ok(Answer::no_passages());
        }

        let context = build_context(
            &hits,
            self.options.context_chunks,
            self.options.max_context_chars,
        );
        let messages = self.messages(question, &context, history);

        let text = self.generator.generate(&messages, &self.params).await?;
        Ok(Answer {
            text: text.trim().to_string(),
            sources: hits,
        })
    }

    fn messages(
        &self,
        question: &str,
        context: &str,
        history: Option<&[ChatMessage]>,
    ) -> Vec<ChatMessage> {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.trim().to_string());
        vars.insert("context".to_string(), context.to_string());
        let user = self.prompts.render_with_custom(&self.prompts.rag.user, &vars);

        let system = match history {
            Some(_) => &self.prompts.rag.chat_system,
            None => &self.prompts.rag.system,
        };

        let mut messages = Vec::new();
        if !system.trim().is_empty() {
            messages.push(ChatMessage::system(system.clone()));
        }
        if let Some(history) = history {
            messages.extend(history.iter().cloned());
        }
        messages.push(ChatMessage::user(user));
        messages
    }

    fn enter_query(&self) {
        let mut status = self.status();
        if matches!(status.state, PipelineState::Indexed | PipelineState::Failed) {
            status.state = PipelineState::Querying;
        }
    }

    fn leave_query<T>(&self, result: &Result<T>) {
        let mut status = self.status();
        if status.state != PipelineState::Querying {
            return;
        }
        match result {
            Ok(_) | Err(MurmurError::Cancelled) => status.state = PipelineState::Indexed,
            Err(e) => {
                status.state = PipelineState::Failed;
                status.last_failure = Some(e.to_string());
            }
        }
    }
}

fn check_request(question: &str, top_k: usize) -> Result<()> {
    if question.trim().is_empty() {
        return Err(MurmurError::InvalidParameter(
            "question must not be empty".to_string(),
        ));
    }
    if top_k == 0 {
        return Err(MurmurError::InvalidParameter(
            "top_k must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::generation::{ExtractiveGenerator, Role};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const DOC: &str = "The council approved the river budget in March. \
Flood barriers will be built along the east bank. \
The library reopens next spring with longer hours. \
Volunteers planted two hundred trees in the park.";

    /// Records what it was asked and answers with a fixed string.
    #[derive(Default)]
    struct RecordingGenerator {
        calls: AtomicUsize,
        last: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        async fn generate(&self, messages: &[ChatMessage], _params: &GenerationParams) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = messages.to_vec();
            Ok("  recorded answer \n".to_string())
        }
    }

    /// Hashing embedder that records its inputs, can be slowed down, and
    /// refuses text containing `POISON`.
    #[derive(Default)]
    struct TestEmbedder {
        inner: HashingEmbedder,
        delay: Duration,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Embedder for TestEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(text.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if text.contains("POISON") {
                return Err(MurmurError::EmbeddingFailed("poisoned input".to_string()));
            }
            self.inner.embed(text).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }
    }

    fn small_chunks() -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: 60,
            overlap: 10,
            max_chunks: None,
        }
    }

    fn pipeline(
        embedder: Arc<TestEmbedder>,
        generator: Arc<dyn Generator>,
    ) -> RagPipeline {
        RagPipeline::new(embedder, generator).with_chunking(small_chunks())
    }

    #[tokio::test]
    async fn test_answer_before_indexing_is_rejected_without_collaborators() {
        let embedder = Arc::new(TestEmbedder::default());
        let generator = Arc::new(RecordingGenerator::default());
        let rag = pipeline(embedder.clone(), generator.clone());

        let err = rag.answer("What was approved?", 3).await.unwrap_err();
        assert!(matches!(err, MurmurError::NotIndexed));
        assert!(matches!(
            rag.retrieve("What was approved?", 3).await,
            Err(MurmurError::NotIndexed)
        ));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rag.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_index_then_answer() {
        let embedder = Arc::new(TestEmbedder::default());
        let rag = pipeline(embedder, Arc::new(ExtractiveGenerator::new()));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let count = rag.start_indexing(DOC, Some(&tx)).await.unwrap();
        assert!(count > 1);
        assert_eq!(rag.state(), PipelineState::Indexed);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(IndexEvent::Status(_))));
        assert_eq!(events.last(), Some(&IndexEvent::Done { chunks: count }));

        let answer = rag.answer("When was the river budget approved?", 3).await.unwrap();
        assert!(!answer.text.is_empty());
        assert_eq!(answer.sources.len(), 3);
        assert!(answer.sources[0].score >= answer.sources[1].score);
        assert_eq!(rag.state(), PipelineState::Indexed);
    }

    #[tokio::test]
    async fn test_prompt_and_query_rendering() {
        let embedder = Arc::new(TestEmbedder::default());
        let generator = Arc::new(RecordingGenerator::default());
        let rag = pipeline(embedder.clone(), generator.clone()).with_options(RetrievalOptions {
            context_chunks: 1,
            ..RetrievalOptions::default()
        });
        rag.start_indexing(DOC, None).await.unwrap();

        let answer = rag.answer(" Who planted trees? ", 2).await.unwrap();
        assert_eq!(answer.text, "recorded answer");

        let seen = embedder.seen.lock().unwrap();
        assert_eq!(
            seen.last().unwrap(),
            "Question: Who planted trees?. Answer using the document."
        );

        let messages = generator.last.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        let expected = format!(
            "Question: Who planted trees?\nContext: {}\nAnswer:",
            answer.sources[0].text
        );
        assert_eq!(messages[1].content, expected);
    }

    #[tokio::test]
    async fn test_min_score_filters_everything() {
        let generator = Arc::new(RecordingGenerator::default());
        let rag = pipeline(Arc::new(TestEmbedder::default()), generator.clone()).with_options(
            RetrievalOptions {
                min_score: Some(1.1),
                ..RetrievalOptions::default()
            },
        );
        rag.start_indexing(DOC, None).await.unwrap();

        let answer = rag.answer("Anything?", 3).await.unwrap();
        assert_eq!(answer, Answer::no_passages());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_request_validation() {
        let rag = pipeline(
            Arc::new(TestEmbedder::default()),
            Arc::new(RecordingGenerator::default()),
        );
        rag.start_indexing(DOC, None).await.unwrap();

        assert!(matches!(
            rag.answer("question", 0).await,
            Err(MurmurError::InvalidParameter(_))
        ));
        assert!(matches!(
            rag.answer("   ", 3).await,
            Err(MurmurError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_document_and_bad_chunking() {
        let embedder = Arc::new(TestEmbedder::default());
        let rag = pipeline(embedder.clone(), Arc::new(RecordingGenerator::default()));
        assert!(matches!(
            rag.start_indexing(" \n\t ", None).await,
            Err(MurmurError::EmptyDocument)
        ));

        let rag = RagPipeline::new(embedder.clone(), Arc::new(RecordingGenerator::default()))
            .with_chunking(ChunkingConfig {
                chunk_size: 10,
                overlap: 10,
                max_chunks: None,
            });
        assert!(matches!(
            rag.start_indexing(DOC, None).await,
            Err(MurmurError::InvalidParameter(_))
        ));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rag.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_failed_indexing_keeps_previous_index() {
        let rag = pipeline(
            Arc::new(TestEmbedder::default()),
            Arc::new(ExtractiveGenerator::new()),
        );
        let first = rag.start_indexing(DOC, None).await.unwrap();

        let err = rag
            .start_indexing("This document is POISON all the way through.", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MurmurError::EmbeddingFailed(_)));
        assert_eq!(rag.state(), PipelineState::Failed);
        assert!(rag.last_failure().unwrap().contains("poisoned"));
        assert_eq!(rag.snapshot().len(), first);

        rag.answer("What reopens next spring?", 2).await.unwrap();
        assert_eq!(rag.state(), PipelineState::Indexed);
    }

    #[tokio::test]
    async fn test_new_indexing_supersedes_running_job() {
        let embedder = Arc::new(TestEmbedder {
            delay: Duration::from_millis(15),
            ..TestEmbedder::default()
        });
        let rag = Arc::new(pipeline(embedder, Arc::new(RecordingGenerator::default())));

        let long_doc = DOC.repeat(6);
        let first = {
            let rag = Arc::clone(&rag);
            tokio::spawn(async move { rag.start_indexing(&long_doc, None).await })
        };
        tokio::time::sleep(Duration::from_millis(40)).await;

        let second = rag
            .start_indexing("Only this short note should remain.", None)
            .await
            .unwrap();

        assert!(matches!(first.await.unwrap(), Err(MurmurError::Cancelled)));
        assert_eq!(second, 1);
        let snapshot = rag.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.chunks()[0].text, "Only this short note should remain.");
        assert_eq!(rag.state(), PipelineState::Indexed);
    }

    #[tokio::test]
    async fn test_chat_keeps_history() {
        let generator = Arc::new(RecordingGenerator::default());
        let rag = pipeline(Arc::new(TestEmbedder::default()), generator.clone());
        rag.start_indexing(DOC, None).await.unwrap();

        let mut session = ChatSession::new();
        rag.chat(&mut session, "What was approved?", 2).await.unwrap();
        rag.chat(&mut session, "And when?", 2).await.unwrap();

        assert_eq!(session.history().len(), 4);
        let messages = generator.last.lock().unwrap();
        // system + two earlier messages + the new question
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].content, Prompts::default().rag.chat_system);
        assert_eq!(messages[1].content, "What was approved?");
    }

    #[tokio::test]
    async fn test_reset_disowns_running_job() {
        let embedder = Arc::new(TestEmbedder {
            delay: Duration::from_millis(15),
            ..TestEmbedder::default()
        });
        let rag = Arc::new(pipeline(embedder, Arc::new(RecordingGenerator::default())));

        let running = {
            let rag = Arc::clone(&rag);
            tokio::spawn(async move { rag.start_indexing(DOC, None).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(rag.state(), PipelineState::Indexing);

        let job = rag.status().job;
        rag.reset();
        assert_eq!(rag.status().job, job + 1);
        assert!(rag.status().cancel.is_none());

        assert!(matches!(running.await.unwrap(), Err(MurmurError::Cancelled)));
        assert!(!rag.is_indexed());
        assert_eq!(rag.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_reset_clears_index() {
        let rag = pipeline(
            Arc::new(TestEmbedder::default()),
            Arc::new(RecordingGenerator::default()),
        );
        rag.start_indexing(DOC, None).await.unwrap();
        rag.reset();
        assert!(!rag.is_indexed());
        assert!(matches!(rag.answer("q", 1).await, Err(MurmurError::NotIndexed)));
    }
}
