//! Search command implementation.

use super::index_with_progress;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use std::path::Path;

/// Run the search command.
pub async fn run_search(
    document: &Path,
    query: &str,
    top_k: Option<usize>,
    json: bool,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(&settings, Operation::Index) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    index_with_progress(&orchestrator, document).await?;

    let spinner = Output::spinner("Searching...");
    let results = orchestrator.search(query, top_k).await;
    spinner.finish_and_clear();

    match results {
        Ok(hits) if json => super::print_json(&hits)?,
        Ok(hits) => {
            if hits.is_empty() {
                Output::warning("No passages matched your query.");
            } else {
                Output::success(&format!("Found {} passages", hits.len()));
                for hit in &hits {
                    Output::hit(hit, 200);
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    orchestrator.shutdown().await?;
    Ok(())
}
