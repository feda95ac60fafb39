//! Content chunking for breaking documents and transcripts into retrieval units.
//!
//! Text is normalized first, then cut into overlapping character windows.
//! Sizes are measured in characters (unicode scalar values), never bytes, so a
//! window never splits a code point.

mod normalize;

pub use normalize::normalize;

use crate::error::{MurmurError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A contiguous span of normalized text used as the retrieval unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position of this chunk in the corpus.
    pub index: usize,
    /// Trimmed text content (never empty).
    pub text: String,
    /// Character range of the window inside the normalized text.
    pub source_offset: Option<Range<usize>>,
}

impl Chunk {
    /// Create a chunk without source offsets.
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            source_offset: None,
        }
    }
}

/// Configuration for chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows.
    pub overlap: usize,
    /// Upper bound on the number of chunks kept for one document.
    pub max_chunks: Option<usize>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            overlap: 200,
            max_chunks: Some(80),
        }
    }
}

impl ChunkingConfig {
    /// Check the window parameters.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(MurmurError::InvalidParameter(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(MurmurError::InvalidParameter(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        if self.max_chunks == Some(0) {
            return Err(MurmurError::InvalidParameter(
                "max_chunks must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Chunk a document according to this configuration.
    pub fn apply(&self, text: &str) -> Result<Vec<Chunk>> {
        self.validate()?;
        let mut chunks = chunk_text(text, self.chunk_size, self.overlap)?;
        if let Some(max) = self.max_chunks {
            chunks.truncate(max);
        }
        Ok(chunks)
    }
}

/// Split text into overlapping character windows.
///
/// The text is normalized, then windows of up to `chunk_size` characters are
/// taken starting at offset 0 and advancing by `chunk_size - overlap`. The
/// window that reaches the end of the text is the last one. Empty windows
/// (after trimming) are skipped.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(MurmurError::InvalidParameter(format!(
            "expected 0 <= overlap < chunk_size, got chunk_size={} overlap={}",
            chunk_size, overlap
        )));
    }

    let normalized = normalize(text);
    let chars: Vec<char> = normalized.chars().collect();
    let step = chunk_size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();

        if !trimmed.is_empty() {
            chunks.push(Chunk {
                index: chunks.len(),
                text: trimmed.to_string(),
                source_offset: Some(start..end),
            });
        }

        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}
