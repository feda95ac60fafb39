//! In-memory vector store for a single indexed document.
//!
//! Chunks and their embeddings are kept as parallel arrays inside an
//! immutable [`IndexSnapshot`]. Indexing builds a fresh snapshot off to the
//! side and swaps it in only once every embedding is present, so a query
//! never sees a half-built index.

use crate::chunking::Chunk;
use crate::embedding::Embedder;
use crate::error::{MurmurError, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Progress is reported after this many embeddings (and after the last one).
pub const PROGRESS_BATCH: usize = 5;

/// A ranked query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    /// Index of the matched chunk.
    pub chunk_index: usize,
    /// Cosine similarity with the query, in [-1, 1].
    pub score: f32,
    /// Text of the matched chunk.
    pub text: String,
}

/// Notifications emitted while a document is being indexed.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEvent {
    /// Free-form stage description.
    Status(String),
    /// `done` of `total` chunks embedded.
    Progress { done: usize, total: usize },
    /// Indexing finished and the new index is visible to queries.
    Done { chunks: usize },
}

pub(crate) fn notify(progress: Option<&UnboundedSender<IndexEvent>>, event: IndexEvent) {
    if let Some(tx) = progress {
        // A dropped receiver only means nobody is watching.
        let _ = tx.send(event);
    }
}

/// Compute cosine similarity between two unit-length vectors.
///
/// This is the dot product; if the lengths ever differ only the shared
/// prefix is compared.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// An immutable, fully built index.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
}

impl IndexSnapshot {
    /// Assemble a snapshot from parallel arrays.
    pub fn from_parts(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(MurmurError::EmbeddingFailed(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        if let Some(first) = embeddings.first() {
            if let Some(bad) = embeddings.iter().position(|e| e.len() != first.len()) {
                return Err(MurmurError::EmbeddingFailed(format!(
                    "embedding {} has dimension {}, expected {}",
                    bad,
                    embeddings[bad].len(),
                    first.len()
                )));
            }
        }
        Ok(Self { chunks, embeddings })
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Indexed chunks in order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Embedding dimension, or 0 for an empty snapshot.
    pub fn dimensions(&self) -> usize {
        self.embeddings.first().map(Vec::len).unwrap_or(0)
    }

    /// Rank every chunk against a query vector and keep the best `k`.
    ///
    /// Scores are sorted descending; ties go to the lower chunk index.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        if k == 0 {
            return Err(MurmurError::InvalidParameter(
                "k must be greater than zero".to_string(),
            ));
        }

        let mut scored: Vec<(usize, f32)> = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(idx, emb)| (idx, cosine_similarity(query, emb)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(idx, score)| QueryHit {
                chunk_index: self.chunks[idx].index,
                score,
                text: self.chunks[idx].text.clone(),
            })
            .collect())
    }
}

/// Holder of the current index snapshot.
pub struct VectorStore {
    current: RwLock<Arc<IndexSnapshot>>,
}

impl VectorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(IndexSnapshot::default())),
        }
    }

    /// The committed snapshot.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of committed chunks.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Embed every chunk in order and return the finished snapshot without
    /// publishing it.
    ///
    /// Checks `cancel` before and during each embedding call.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        progress: Option<&UnboundedSender<IndexEvent>>,
        cancel: &CancellationToken,
    ) -> Result<IndexSnapshot> {
        let total = chunks.len();
        let mut embeddings = Vec::with_capacity(total);

        notify(progress, IndexEvent::Status("Indexing chunks".to_string()));

        for (i, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(MurmurError::Cancelled);
            }

            let embedding = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MurmurError::Cancelled),
                result = embedder.embed(&chunk.text) => result?,
            };
            embeddings.push(embedding);

            let done = i + 1;
            if done % PROGRESS_BATCH == 0 || done == total {
                debug!("Embedded {}/{} chunks", done, total);
                notify(progress, IndexEvent::Progress { done, total });
            }
        }

        IndexSnapshot::from_parts(chunks, embeddings)
    }

    /// Publish a snapshot, replacing whatever was there.
    pub fn commit(&self, snapshot: IndexSnapshot) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(snapshot);
    }

    /// Drop the committed index.
    pub fn clear(&self) {
        self.commit(IndexSnapshot::default());
    }

    /// Embed and publish a set of chunks.
    ///
    /// On failure or cancellation the previous index stays in place.
    pub async fn index(
        &self,
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        progress: Option<&UnboundedSender<IndexEvent>>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let snapshot = Self::build(chunks, embedder, progress, cancel).await?;
        let count = snapshot.len();
        self.commit(snapshot);
        info!("Indexed {} chunks", count);
        notify(progress, IndexEvent::Done { chunks: count });
        Ok(count)
    }

    /// Rank the committed chunks against a query text.
    ///
    /// An empty store answers with no hits and never calls the embedder.
    pub async fn query(
        &self,
        query_text: &str,
        embedder: &dyn Embedder,
        k: usize,
    ) -> Result<Vec<QueryHit>> {
        if k == 0 {
            return Err(MurmurError::InvalidParameter(
                "k must be greater than zero".to_string(),
            ));
        }
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }
        let query = embedder.embed(query_text).await?;
        snapshot.search(&query, k)
    }

    /// Rank the committed chunks against a precomputed query vector.
    pub fn query_vector(&self, query: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        let snapshot = self.snapshot();
        if k > 0 && snapshot.is_empty() {
            return Ok(Vec::new());
        }
        snapshot.search(query, k)
    }
}

impl Default for VectorStore {
    fn default() -> Self {
        Self::new()
    }
}
