//! Embedding generation for semantic search and retrieval.
//!
//! Every embedder returns L2-normalized vectors so that a dot product is the
//! cosine similarity.

mod hashing;
mod openai;

pub use hashing::HashingEmbedder;
pub use openai::OpenAIEmbedder;

use crate::error::{MurmurError, Result};
use async_trait::async_trait;

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate a normalized embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// Scale a vector to unit length in place.
///
/// Fails on an all-zero (or non-finite) vector, which has no direction.
pub fn l2_normalize(vector: &mut [f32]) -> Result<()> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(MurmurError::EmbeddingFailed(
            "cannot normalize a zero-length vector".to_string(),
        ));
    }
    for x in vector.iter_mut() {
        *x /= norm;
    }
    Ok(())
}
