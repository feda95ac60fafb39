//! Perspective assistant for live conversations.
//!
//! The recent transcript is classified zero-shot against six thinking
//! perspectives. The winning perspective's persona then answers the
//! speaker directly.

mod zero_shot;

pub use zero_shot::{EmbeddingClassifier, DEFAULT_HYPOTHESIS};

use crate::config::AssistantPrompts;
use crate::error::{MurmurError, Result};
use crate::generation::{ChatMessage, GenerationParams};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Score of one candidate label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Trait for zero-shot text classification.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Score `text` against every label. Results are sorted by score,
    /// highest first, and sum to one.
    async fn classify(&self, text: &str, labels: &[String]) -> Result<Vec<LabelScore>>;
}

/// The six perspectives the assistant can answer from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    Facts,
    Feelings,
    Risks,
    Benefits,
    Creativity,
    Process,
}

impl Perspective {
    pub const ALL: [Perspective; 6] = [
        Perspective::Facts,
        Perspective::Feelings,
        Perspective::Risks,
        Perspective::Benefits,
        Perspective::Creativity,
        Perspective::Process,
    ];

    /// Description the classifier scores the text against.
    pub fn label(&self) -> &'static str {
        match self {
            Perspective::Facts => "objective facts, data, and neutral information",
            Perspective::Feelings => "display of personal and biased feelings or emotions",
            Perspective::Risks => "risks, flaws, or criticism",
            Perspective::Benefits => "benefits, value, or advantages",
            Perspective::Creativity => "creativity, brainstorming, and alternative solutions",
            Perspective::Process => "organization of tasks or summarization",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Perspective::Facts => "facts",
            Perspective::Feelings => "feelings",
            Perspective::Risks => "risks",
            Perspective::Benefits => "benefits",
            Perspective::Creativity => "creativity",
            Perspective::Process => "process",
        }
    }
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the assistant said, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantReply {
    pub perspective: Perspective,
    pub scores: Vec<LabelScore>,
    pub response: String,
}

/// Candidate labels in classifier order.
pub fn candidate_labels() -> Vec<String> {
    Perspective::ALL.iter().map(|p| p.label().to_string()).collect()
}

/// Pick the perspective with the highest score.
pub fn pick(scores: &[LabelScore]) -> Result<Perspective> {
    scores
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .and_then(|best| Perspective::from_label(&best.label))
        .ok_or_else(|| {
            MurmurError::ClassificationFailed("no known perspective among the scores".to_string())
        })
}

/// Sampling for persona replies: short and mostly deterministic.
pub fn assistant_params() -> GenerationParams {
    GenerationParams {
        max_new_tokens: 140,
        temperature: 0.3,
        top_p: Some(0.9),
        top_k: Some(15),
        repetition_penalty: None,
        do_sample: true,
    }
}

pub fn assistant_messages(prompts: &AssistantPrompts, perspective: Perspective, text: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(prompts.persona(perspective).to_string()),
        ChatMessage::user(text.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(p: Perspective, score: f32) -> LabelScore {
        LabelScore {
            label: p.label().to_string(),
            score,
        }
    }

    #[test]
    fn test_labels_round_trip() {
        for p in Perspective::ALL {
            assert_eq!(Perspective::from_label(p.label()), Some(p));
        }
        assert_eq!(candidate_labels().len(), 6);
    }

    #[test]
    fn test_pick_highest() {
        let scores = vec![
            score(Perspective::Facts, 0.1),
            score(Perspective::Risks, 0.7),
            score(Perspective::Process, 0.2),
        ];
        assert_eq!(pick(&scores).unwrap(), Perspective::Risks);
        assert!(pick(&[]).is_err());
    }

    #[test]
    fn test_messages_use_persona() {
        let prompts = AssistantPrompts::default();
        let messages = assistant_messages(&prompts, Perspective::Feelings, "I feel uneasy");
        assert_eq!(messages[0].content, prompts.feelings);
        assert_eq!(messages[1].content, "I feel uneasy");
    }
}
