//! Offline feature-hashing embedder.
//!
//! Maps lowercase word unigrams and bigrams into a fixed number of buckets
//! with a signed FNV-1a hash, then normalizes. No model weights, no network:
//! good enough to rank passages that share vocabulary with the question.

use super::{l2_normalize, Embedder};
use crate::error::{MurmurError, Result};
use async_trait::async_trait;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic hashing embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// Create an embedder with the default 384 dimensions.
    pub fn new() -> Self {
        Self::with_dimensions(384)
    }

    /// Create an embedder with a custom number of dimensions.
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn fnv1a(bytes: &[u8]) -> u64 {
        bytes.iter().fold(FNV_OFFSET, |hash, b| {
            (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
        })
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = Self::fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }

    /// Embed synchronously.
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = Self::tokens(text);

        if tokens.is_empty() {
            let raw = text.trim();
            if raw.is_empty() {
                return Err(MurmurError::EmbeddingFailed(
                    "cannot embed empty text".to_string(),
                ));
            }
            self.add_feature(&mut vector, raw, 1.0);
        }

        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        l2_normalize(&mut vector)?;
        Ok(vector)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_sync(text)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::cosine_similarity;

    #[test]
    fn test_unit_length_and_dimensions() {
        let embedder = HashingEmbedder::with_dimensions(64);
        let v = embedder.embed_sync("The budget for last year was approved").unwrap();
        assert_eq!(v.len(), 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_deterministic() {
        let embedder = HashingEmbedder::new();
        assert_eq!(
            embedder.embed_sync("same text").unwrap(),
            embedder.embed_sync("same text").unwrap()
        );
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let embedder = HashingEmbedder::new();
        let query = embedder.embed_sync("annual budget approval").unwrap();
        let related = embedder
            .embed_sync("The annual budget was sent for approval in March")
            .unwrap();
        let unrelated = embedder
            .embed_sync("Penguins live in the southern hemisphere")
            .unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_punctuation_only_text_still_embeds() {
        let embedder = HashingEmbedder::new();
        assert!(embedder.embed_sync("...").is_ok());
        assert!(embedder.embed_sync("   ").is_err());
    }

    #[test]
    fn test_async_embed_matches_sync() {
        let embedder = HashingEmbedder::new();
        let via_trait = tokio_test::block_on(embedder.embed("hola mundo")).unwrap();
        assert_eq!(via_trait, embedder.embed_sync("hola mundo").unwrap());
    }
}
