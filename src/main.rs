//! Murmur CLI entry point.

use anyhow::Result;
use clap::Parser;
use murmur::cli::{commands, Cli, Commands};
use murmur::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&Settings::expand_path(path)))?,
        None => Settings::load()?,
    };

    // Initialize logging. Without -v the configured level applies.
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("murmur={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    // Execute command
    match &cli.command {
        Commands::Chunk {
            document,
            size,
            overlap,
            json,
        } => {
            commands::run_chunk(document, *size, *overlap, *json, settings).await?;
        }

        Commands::Search {
            document,
            query,
            top_k,
            json,
        } => {
            commands::run_search(document, query, *top_k, *json, settings).await?;
        }

        Commands::Ask {
            document,
            question,
            top_k,
            exclusive,
            json,
        } => {
            commands::run_ask(document, question, *top_k, *exclusive, *json, settings).await?;
        }

        Commands::Chat { document, top_k } => {
            commands::run_chat(document, *top_k, settings).await?;
        }

        Commands::Assist { text, audio, json } => {
            commands::run_assist(text, audio, *json, settings).await?;
        }

        Commands::Audit {
            image,
            question,
            json,
        } => {
            commands::run_audit(image, question.as_deref(), *json, settings).await?;
        }

        Commands::Slots { start, json } => {
            commands::run_slots(*start, *json, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, cli.config.as_deref(), settings)?;
        }
    }

    Ok(())
}
