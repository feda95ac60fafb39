//! Pre-flight checks before expensive operations.
//!
//! Validates that the configured backends can be reached before starting
//! operations that would otherwise fail midway.

use crate::config::{EmbeddingProvider, GenerationProvider, Settings};
use crate::error::{MurmurError, Result};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Indexing needs the embedder.
    Index,
    /// Answering needs the embedder and the generator.
    Ask,
    /// The assistant needs the generator, and the recognizer for audio.
    Assist { audio: bool },
    /// Auditing needs the captioner and the generator.
    Audit,
}

/// A remote backend and where it lives.
struct Backend<'a> {
    name: &'static str,
    base_url: Option<&'a String>,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(settings: &Settings, operation: Operation) -> Result<()> {
    for backend in remote_backends(settings, operation) {
        check_api_key(settings, &backend)?;
    }
    Ok(())
}

fn remote_backends(settings: &Settings, operation: Operation) -> Vec<Backend<'_>> {
    let embedding = Backend {
        name: "embedding",
        base_url: settings.embedding.base_url.as_ref(),
    };
    let generation = Backend {
        name: "generation",
        base_url: settings.generation.base_url.as_ref(),
    };
    let remote_embedding = settings.embedding.provider == EmbeddingProvider::OpenAI;
    let remote_generation = settings.generation.provider == GenerationProvider::OpenAI;

    let mut backends = Vec::new();
    match operation {
        Operation::Index => {
            if remote_embedding {
                backends.push(embedding);
            }
        }
        Operation::Ask => {
            if remote_embedding {
                backends.push(embedding);
            }
            if remote_generation {
                backends.push(generation);
            }
        }
        Operation::Assist { audio } => {
            if audio {
                backends.push(Backend {
                    name: "transcription",
                    base_url: settings.transcription.base_url.as_ref(),
                });
            }
            if remote_generation {
                backends.push(generation);
            }
        }
        Operation::Audit => {
            backends.push(Backend {
                name: "vision",
                base_url: settings.vision.base_url.as_ref(),
            });
            if remote_generation {
                backends.push(generation);
            }
        }
    }
    backends
}

/// A key is needed for the hosted API. Local servers usually accept none.
fn check_api_key(settings: &Settings, backend: &Backend<'_>) -> Result<()> {
    if backend.base_url.is_some() {
        return Ok(());
    }
    if settings.general.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
        return Ok(());
    }
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        _ => Err(MurmurError::Config(format!(
            "The {} backend uses the hosted API but no key is configured. \
Set OPENAI_API_KEY, add general.api_key to the config, or point {}.base_url at a local server.",
            backend.name, backend.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_defaults_need_nothing() {
        let settings = Settings::default();
        assert!(remote_backends(&settings, Operation::Index).is_empty());
        assert!(remote_backends(&settings, Operation::Ask).is_empty());
        assert!(remote_backends(&settings, Operation::Assist { audio: false }).is_empty());
        assert!(check(&settings, Operation::Ask).is_ok());
    }

    #[test]
    fn test_remote_backends_are_listed() {
        let mut settings = Settings::default();
        settings.generation.provider = GenerationProvider::OpenAI;
        let names: Vec<_> = remote_backends(&settings, Operation::Audit)
            .iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["vision", "generation"]);

        let names: Vec<_> = remote_backends(&settings, Operation::Assist { audio: true })
            .iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["transcription", "generation"]);
    }

    #[test]
    fn test_local_server_needs_no_key() {
        let mut settings = Settings::default();
        settings.vision.base_url = Some("http://localhost:8080/v1".to_string());
        assert!(check(&settings, Operation::Audit).is_ok());

        settings.general.api_key = Some("sk-test".to_string());
        settings.vision.base_url = None;
        assert!(check(&settings, Operation::Audit).is_ok());
    }
}
