//! Chunk command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::load_document;
use anyhow::{Context, Result};
use std::path::Path;

/// Run the chunk command.
pub async fn run_chunk(
    document: &Path,
    size: Option<usize>,
    overlap: Option<usize>,
    json: bool,
    settings: Settings,
) -> Result<()> {
    let mut config = settings.chunking.to_config();
    if let Some(size) = size {
        config.chunk_size = size;
    }
    if let Some(overlap) = overlap {
        config.overlap = overlap;
    }

    let text = load_document(document, settings.general.max_pages)
        .await
        .with_context(|| format!("Failed to read {}", document.display()))?;
    let chunks = config.apply(&text)?;

    if json {
        return super::print_json(&chunks);
    }

    if chunks.is_empty() {
        Output::warning("The document has no text to chunk.");
        return Ok(());
    }

    Output::success(&format!(
        "{} chunks (size {}, overlap {})",
        chunks.len(),
        config.chunk_size,
        config.overlap
    ));
    for chunk in &chunks {
        let range = chunk
            .source_offset
            .as_ref()
            .map(|r| format!("chars {}..{}", r.start, r.end))
            .unwrap_or_default();
        Output::header(&format!("Chunk {} {}", chunk.index, range));
        println!("{}", chunk.text);
    }

    Ok(())
}
