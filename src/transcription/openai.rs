//! Transcription through an OpenAI-compatible `/audio/transcriptions` endpoint.

use super::{encode_wav, Transcriber, SAMPLE_RATE};
use crate::error::{MurmurError, Result};
use crate::openai::{create_client, Endpoint};
use async_openai::types::{AudioInput, AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Whisper-style transcriber. Audio is sent as an in-memory WAV file.
pub struct OpenAITranscriber {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    language: Option<String>,
}

impl OpenAITranscriber {
    pub fn with_config(endpoint: &Endpoint, model: &str, language: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: create_client(endpoint)?,
            model: model.to_string(),
            language: language.map(|s| s.to_string()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Transcriber for OpenAITranscriber {
    #[instrument(skip(self, samples), fields(model = %self.model, seconds = samples.len() as f32 / SAMPLE_RATE as f32))]
    async fn transcribe(&self, samples: &[f32]) -> Result<String> {
        if samples.is_empty() {
            return Err(MurmurError::InvalidParameter(
                "no audio samples to transcribe".to_string(),
            ));
        }

        let mut request_builder = CreateTranscriptionRequestArgs::default();
        request_builder
            .file(AudioInput::from_vec_u8(
                "utterance.wav".to_string(),
                encode_wav(samples),
            ))
            .model(&self.model)
            .response_format(AudioResponseFormat::Json);

        if let Some(lang) = &self.language {
            request_builder.language(lang);
        }

        let request = request_builder.build().map_err(|e| {
            MurmurError::OpenAI(format!("Failed to build request: {}", e))
        })?;

        let response = self
            .client
            .audio()
            .transcribe(request)
            .await
            .map_err(|e| MurmurError::OpenAI(format!("{} API error: {}", self.model, e)))?;

        let text = response.text.trim().to_string();
        debug!("Transcribed {} characters", text.len());
        Ok(text)
    }
}
