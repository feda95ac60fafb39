//! OpenAI-compatible embeddings implementation.

use super::{l2_normalize, Embedder};
use crate::error::{MurmurError, Result};
use crate::openai::{create_client, Endpoint};
use async_openai::types::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAIEmbedder {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    dimensions: usize,
    /// Whether to send `dimensions` in the request (local servers often reject it).
    request_dimensions: bool,
}

impl OpenAIEmbedder {
    /// Create a new embedder against the given endpoint.
    pub fn with_config(endpoint: &Endpoint, model: &str, dimensions: usize) -> Result<Self> {
        Ok(Self {
            client: create_client(endpoint)?,
            model: model.to_string(),
            dimensions,
            request_dimensions: endpoint.base_url.is_none(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    #[instrument(skip(self, text))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| MurmurError::EmbeddingFailed("Empty embedding response".to_string()))
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        const BATCH_SIZE: usize = 100;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let mut args = CreateEmbeddingRequestArgs::default();
            args.model(&self.model)
                .input(EmbeddingInput::StringArray(chunk.to_vec()));
            if self.request_dimensions {
                args.dimensions(self.dimensions as u32);
            }
            let request = args.build().map_err(|e| {
                MurmurError::EmbeddingFailed(format!("Failed to build request: {}", e))
            })?;

            let response = self
                .client
                .embeddings()
                .create(request)
                .await
                .map_err(|e| MurmurError::EmbeddingFailed(format!("Embedding API error: {}", e)))?;

            // Sort by index to ensure correct order
            let mut embeddings: Vec<_> = response.data.into_iter().collect();
            embeddings.sort_by_key(|e| e.index);

            for embedding_data in embeddings {
                let mut vector = embedding_data.embedding;
                l2_normalize(&mut vector)?;
                all_embeddings.push(vector);
            }
        }

        if all_embeddings.len() != texts.len() {
            return Err(MurmurError::EmbeddingFailed(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                all_embeddings.len()
            )));
        }

        debug!("Generated {} embeddings", all_embeddings.len());
        Ok(all_embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedder_creation() {
        let endpoint = Endpoint {
            base_url: Some("http://localhost:8080/v1".to_string()),
            api_key: Some("local".to_string()),
            timeout_secs: Some(5),
        };
        let embedder = OpenAIEmbedder::with_config(&endpoint, "all-minilm", 384).unwrap();
        assert_eq!(embedder.dimensions(), 384);
        assert!(!embedder.request_dimensions);
    }
}
