//! Client construction for OpenAI-compatible inference servers.
//!
//! Every remote collaborator (embeddings, chat, transcription, vision) goes
//! through here so that a local server can stand in for the hosted API.

use crate::error::Result;
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default timeout for inference requests (5 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Connection parameters shared by the OpenAI-compatible backends.
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    /// Base URL, e.g. `http://localhost:8080/v1`. `None` uses the hosted API.
    pub base_url: Option<String>,
    /// API key. `None` falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// Create a client for the given endpoint.
pub fn create_client(endpoint: &Endpoint) -> Result<Client<OpenAIConfig>> {
    let timeout = Duration::from_secs(endpoint.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
    let http_client = reqwest::Client::builder().timeout(timeout).build()?;

    let mut config = OpenAIConfig::default();
    if let Some(base) = &endpoint.base_url {
        config = config.with_api_base(base);
    }
    if let Some(key) = &endpoint.api_key {
        config = config.with_api_key(key);
    }

    Ok(Client::with_config(config).with_http_client(http_client))
}
