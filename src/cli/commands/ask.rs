//! Ask command implementation.

use super::index_with_progress;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use std::path::Path;

/// Run the ask command.
pub async fn run_ask(
    document: &Path,
    question: &str,
    top_k: Option<usize>,
    exclusive: bool,
    json: bool,
    mut settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(&settings, Operation::Ask) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    if exclusive {
        settings.retrieval.exclusive_generation = true;
    }
    let orchestrator = Orchestrator::new(settings)?;
    index_with_progress(&orchestrator, document).await?;

    let spinner = Output::spinner("Thinking...");
    let result = orchestrator.ask(question, top_k).await;
    spinner.finish_and_clear();

    match result {
        Ok(answer) if json => super::print_json(&answer)?,
        Ok(answer) => {
            println!("\n{}\n", answer.text);

            if !answer.sources.is_empty() {
                Output::header("Sources");
                for source in &answer.sources {
                    Output::hit(source, 100);
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    }

    orchestrator.shutdown().await?;
    Ok(())
}
