//! Configuration module for Murmur.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AssistantPrompts, AuditPrompts, Prompts, RagPrompts};
pub use settings::{
    ChunkingSettings, EmbeddingProvider, EmbeddingSettings, GeneralSettings, GenerationProvider,
    GenerationSettings, PromptSettings, RetrievalSettings, SchedulerSettings, Settings,
    TranscriptionSettings, VisionSettings,
};
