//! Zero-shot classification over sentence embeddings.
//!
//! Each label is turned into a hypothesis sentence and embedded. The text is
//! scored by cosine similarity against every hypothesis, and a softmax turns
//! the similarities into a distribution.

use super::{Classifier, LabelScore};
use crate::embedding::Embedder;
use crate::error::{MurmurError, Result};
use crate::vector_store::cosine_similarity;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// `{}` is replaced by the label.
pub const DEFAULT_HYPOTHESIS: &str = "The text focuses mainly on {}";

/// Cosine similarities are divided by this before the softmax.
const TEMPERATURE: f32 = 0.05;

pub struct EmbeddingClassifier {
    embedder: Arc<dyn Embedder>,
    hypothesis: String,
}

impl EmbeddingClassifier {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            hypothesis: DEFAULT_HYPOTHESIS.to_string(),
        }
    }

    pub fn with_hypothesis(mut self, template: &str) -> Self {
        self.hypothesis = template.to_string();
        self
    }

    fn hypothesis_for(&self, label: &str) -> String {
        if self.hypothesis.contains("{}") {
            self.hypothesis.replace("{}", label)
        } else {
            format!("{} {}", self.hypothesis, label)
        }
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

#[async_trait]
impl Classifier for EmbeddingClassifier {
    async fn classify(&self, text: &str, labels: &[String]) -> Result<Vec<LabelScore>> {
        if labels.is_empty() {
            return Err(MurmurError::InvalidParameter(
                "at least one candidate label is required".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(MurmurError::InvalidParameter(
                "cannot classify empty text".to_string(),
            ));
        }

        let classification_err = |e: MurmurError| MurmurError::ClassificationFailed(e.to_string());
        let text_vector = self.embedder.embed(text).await.map_err(classification_err)?;
        let hypotheses: Vec<String> = labels.iter().map(|l| self.hypothesis_for(l)).collect();
        let label_vectors = self
            .embedder
            .embed_batch(&hypotheses)
            .await
            .map_err(classification_err)?;

        let logits: Vec<f32> = label_vectors
            .iter()
            .map(|v| cosine_similarity(&text_vector, v) / TEMPERATURE)
            .collect();

        let mut scores: Vec<LabelScore> = labels
            .iter()
            .zip(softmax(&logits))
            .map(|(label, score)| LabelScore {
                label: label.clone(),
                score,
            })
            .collect();
        scores.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!(winner = %scores[0].label, score = scores[0].score, "classified text");
        Ok(scores)
    }
}
