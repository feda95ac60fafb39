//! Interactive chat command.

use super::index_with_progress;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::rag::ChatSession;
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Run the interactive chat command.
pub async fn run_chat(document: &Path, top_k: Option<usize>, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(&settings, Operation::Ask) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    index_with_progress(&orchestrator, document).await?;

    let mut session = ChatSession::new();

    println!("\n{}", style("Murmur Chat").bold().cyan());
    println!(
        "{}\n",
        style("Type your questions, or 'exit' to quit. Use 'clear' to reset conversation.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            session.clear();
            Output::info("Conversation history cleared.");
            continue;
        }

        match orchestrator.chat(&mut session, input, top_k).await {
            Ok(answer) => {
                println!("\n{} {}\n", style("Murmur:").cyan().bold(), answer.text);
                let cited: Vec<String> = answer
                    .sources
                    .iter()
                    .map(|s| s.chunk_index.to_string())
                    .collect();
                if !cited.is_empty() {
                    println!("{}\n", style(format!("  chunks {}", cited.join(", "))).dim());
                }
            }
            Err(e) => {
                Output::error(&format!("Error: {}", e));
            }
        }
    }

    orchestrator.shutdown().await?;
    Ok(())
}
