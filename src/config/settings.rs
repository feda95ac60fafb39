//! Configuration settings for Murmur.

use crate::chunking::ChunkingConfig;
use crate::generation::GenerationParams;
use crate::openai::Endpoint;
use crate::scheduler::{SchedulerConfig, SlotSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub retrieval: RetrievalSettings,
    pub scheduler: SchedulerSettings,
    pub transcription: TranscriptionSettings,
    pub vision: VisionSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// API key for OpenAI-compatible backends. Falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Request timeout for remote backends, in seconds.
    pub timeout_secs: u64,
    /// Maximum number of page files read from a document directory.
    pub max_pages: usize,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            api_key: None,
            timeout_secs: crate::openai::DEFAULT_TIMEOUT_SECS,
            max_pages: 50,
        }
    }
}

/// Document chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Window size in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows.
    pub overlap: usize,
    /// Chunks kept per document. `None` keeps all of them.
    pub max_chunks: Option<usize>,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        let defaults = ChunkingConfig::default();
        Self {
            chunk_size: defaults.chunk_size,
            overlap: defaults.overlap,
            max_chunks: defaults.max_chunks,
        }
    }
}

impl ChunkingSettings {
    pub fn to_config(&self) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            max_chunks: self.max_chunks,
        }
    }
}

/// Embedding backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Offline feature hashing.
    #[default]
    Hash,
    /// OpenAI-compatible `/embeddings` endpoint.
    OpenAI,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hash" | "hashing" | "offline" => Ok(EmbeddingProvider::Hash),
            "openai" => Ok(EmbeddingProvider::OpenAI),
            _ => Err(format!("Unknown embedding provider: {}", s)),
        }
    }
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProvider::Hash => write!(f, "hash"),
            EmbeddingProvider::OpenAI => write!(f, "openai"),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    /// Embedding model (openai provider).
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: usize,
    /// Base URL of a compatible server. `None` uses the hosted API.
    pub base_url: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hash,
            model: "text-embedding-3-small".to_string(),
            dimensions: 384,
            base_url: None,
        }
    }
}

/// Text generation backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Offline: quote the leading sentences of the context.
    #[default]
    Extractive,
    /// OpenAI-compatible `/chat/completions` endpoint.
    OpenAI,
}

impl std::str::FromStr for GenerationProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "extractive" | "offline" => Ok(GenerationProvider::Extractive),
            "openai" => Ok(GenerationProvider::OpenAI),
            _ => Err(format!("Unknown generation provider: {}", s)),
        }
    }
}

impl std::fmt::Display for GenerationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationProvider::Extractive => write!(f, "extractive"),
            GenerationProvider::OpenAI => write!(f, "openai"),
        }
    }
}

/// Text generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub provider: GenerationProvider,
    /// Chat model (openai provider).
    pub model: String,
    pub base_url: Option<String>,
    /// Sampling for document answers.
    pub params: GenerationParams,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::Extractive,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            params: GenerationParams::default(),
        }
    }
}

/// Retrieval and question-answering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Hits retrieved per question.
    pub top_k: usize,
    /// Hits quoted in the prompt context.
    pub context_chunks: usize,
    /// Upper bound on the prompt context, in characters.
    pub max_context_chars: usize,
    /// Hits scoring below this are dropped.
    pub min_score: Option<f32>,
    /// Wraps the question before it is embedded. `{{question}}` is the placeholder.
    pub query_template: String,
    /// Tear down every other worker while answering.
    pub exclusive_generation: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            context_chunks: 2,
            max_context_chars: 4000,
            min_score: None,
            query_template: "Question: {{question}}. Answer using the document.".to_string(),
            exclusive_generation: false,
        }
    }
}

/// Worker scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Upper bound on waiting for the accelerator, in milliseconds.
    pub quiescence_timeout_ms: u64,
    /// Pause between light and heavy slots at startup, in milliseconds.
    pub settle_delay_ms: u64,
    /// Slot table.
    pub slots: Vec<SlotSpec>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            quiescence_timeout_ms: defaults.quiescence_timeout.as_millis() as u64,
            settle_delay_ms: defaults.settle_delay.as_millis() as u64,
            slots: SlotSpec::defaults(),
        }
    }
}

impl SchedulerSettings {
    pub fn to_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            quiescence_timeout: Duration::from_millis(self.quiescence_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            ..SchedulerConfig::default()
        }
    }
}

/// Speech-to-text settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    pub model: String,
    /// Language hint (ISO-639-1). `None` lets the model detect it.
    pub language: Option<String>,
    pub base_url: Option<String>,
    /// Utterances kept in the assistant's context window.
    pub window: usize,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            language: None,
            base_url: None,
            window: crate::transcription::DEFAULT_WINDOW,
        }
    }
}

/// Image captioning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionSettings {
    pub model: String,
    pub base_url: Option<String>,
    /// Token budget for a caption.
    pub max_tokens: u32,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            max_tokens: 100,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::MurmurError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("murmur")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Connection parameters for a backend with the given base URL.
    pub fn endpoint(&self, base_url: Option<&String>) -> Endpoint {
        Endpoint {
            base_url: base_url.cloned(),
            api_key: self.general.api_key.clone(),
            timeout_secs: Some(self.general.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.chunking.chunk_size, 1200);
        assert_eq!(settings.chunking.overlap, 200);
        assert_eq!(settings.chunking.max_chunks, Some(80));
        assert_eq!(settings.retrieval.context_chunks, 2);
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Hash);
        assert_eq!(settings.general.max_pages, 50);
        assert_eq!(settings.scheduler.slots.len(), 4);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
[retrieval]
top_k = 8

[embedding]
provider = "openai"
base_url = "http://localhost:8080/v1"
"#,
        )
        .unwrap();
        assert_eq!(settings.retrieval.top_k, 8);
        assert_eq!(settings.retrieval.context_chunks, 2);
        assert_eq!(settings.embedding.provider, EmbeddingProvider::OpenAI);
        assert_eq!(settings.embedding.dimensions, 384);
        assert_eq!(settings.chunking.chunk_size, 1200);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.generation.provider = GenerationProvider::OpenAI;
        settings.retrieval.min_score = Some(0.25);
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.generation.provider, GenerationProvider::OpenAI);
        assert_eq!(loaded.retrieval.min_score, Some(0.25));
        assert_eq!(loaded.scheduler.slots, SlotSpec::defaults());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Settings::load_from(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(loaded.retrieval.top_k, 5);
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("OpenAI".parse::<EmbeddingProvider>().unwrap(), EmbeddingProvider::OpenAI);
        assert_eq!(
            "offline".parse::<GenerationProvider>().unwrap(),
            GenerationProvider::Extractive
        );
        assert!("bert".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn test_scheduler_config() {
        let settings = SchedulerSettings {
            quiescence_timeout_ms: 1500,
            settle_delay_ms: 0,
            ..Default::default()
        };
        let config = settings.to_config();
        assert_eq!(config.quiescence_timeout, Duration::from_millis(1500));
        assert_eq!(config.settle_delay, Duration::ZERO);
    }
}
