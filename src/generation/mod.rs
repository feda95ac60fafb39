//! Text generation collaborators.
//!
//! The core only ever sees a list of chat messages plus sampling parameters
//! and gets a string back.

mod extractive;
mod openai;

pub use extractive::ExtractiveGenerator;
pub use openai::OpenAIGenerator;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters for a generation request.
///
/// Backends ignore the fields they cannot express.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub repetition_penalty: Option<f32>,
    pub do_sample: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            temperature: 0.7,
            top_p: None,
            top_k: None,
            repetition_penalty: None,
            do_sample: true,
        }
    }
}

/// Trait for text generation.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for the conversation.
    async fn generate(&self, messages: &[ChatMessage], params: &GenerationParams) -> Result<String>;
}
