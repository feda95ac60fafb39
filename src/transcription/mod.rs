//! Speech-to-text for live captions.
//!
//! Audio arrives as 16 kHz mono PCM samples. Recognized utterances are kept
//! in a [`TranscriptBuffer`] whose rolling window feeds the perspective
//! assistant.

mod buffer;
mod openai;
mod wav;

pub use buffer::{TranscriptBuffer, Utterance, DEFAULT_WINDOW};
pub use openai::OpenAITranscriber;
pub use wav::{decode_wav, encode_wav};

use crate::error::Result;
use async_trait::async_trait;

/// Sample rate every transcriber expects.
pub const SAMPLE_RATE: u32 = 16_000;

/// Trait for transcription services.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe 16 kHz mono samples in `[-1.0, 1.0]`.
    async fn transcribe(&self, samples: &[f32]) -> Result<String>;
}
