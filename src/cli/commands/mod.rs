//! CLI command implementations.

mod ask;
mod assist;
mod audit;
mod chat;
mod chunk;
mod config;
mod search;
mod slots;

pub use ask::run_ask;
pub use assist::run_assist;
pub use audit::run_audit;
pub use chat::run_chat;
pub use chunk::run_chunk;
pub use config::run_config;
pub use search::run_search;
pub use slots::run_slots;

use crate::cli::Output;
use crate::orchestrator::{load_document, Orchestrator};
use crate::vector_store::IndexEvent;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tokio::sync::mpsc;

/// Load and index a document, showing a progress bar while it embeds.
pub(crate) async fn index_with_progress(orchestrator: &Orchestrator, path: &Path) -> Result<usize> {
    let text = load_document(path, orchestrator.settings().general.max_pages)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let pb = Output::progress_bar(0, "Preparing document");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let bar = pb.clone();
    let ui = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                IndexEvent::Status(msg) => bar.set_message(msg),
                IndexEvent::Progress { done, total } => {
                    bar.set_length(total as u64);
                    bar.set_position(done as u64);
                }
                IndexEvent::Done { chunks } => {
                    bar.finish_and_clear();
                    Output::success(&format!("Indexed {} chunks", chunks));
                }
            }
        }
    });

    let result = orchestrator.index_document(&text, Some(&tx)).await;
    drop(tx);
    let _ = ui.await;

    match result {
        Ok(chunks) => Ok(chunks),
        Err(e) => {
            pb.abandon();
            Output::error(&format!("Indexing failed: {}", e));
            Err(e.into())
        }
    }
}

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
