//! CLI module for Murmur.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Murmur - document and conversation assistant
///
/// Indexes a document and answers questions about it, reacts to a live
/// conversation from different thinking perspectives, and audits interface
/// screenshots. Inference workers share one accelerator and are scheduled so
/// they never contend for it.
#[derive(Parser, Debug)]
#[command(name = "murmur")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split a document into chunks and print them
    Chunk {
        /// Text file, or directory of page files
        document: PathBuf,

        /// Window size in characters (overrides config)
        #[arg(long)]
        size: Option<usize>,

        /// Overlap in characters (overrides config)
        #[arg(long)]
        overlap: Option<usize>,

        /// Print chunks as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find the passages of a document most relevant to a query
    Search {
        /// Text file, or directory of page files
        document: PathBuf,

        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask a question about a document
    Ask {
        /// Text file, or directory of page files
        document: PathBuf,

        /// The question to ask
        question: String,

        /// Passages retrieved for the answer
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Tear down every other worker while answering
        #[arg(long)]
        exclusive: bool,

        /// Print the answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive chat about a document
    Chat {
        /// Text file, or directory of page files
        document: PathBuf,

        /// Passages retrieved per message
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// React to a conversation from the best-fitting perspective
    Assist {
        /// What was said. Reads stdin, one utterance per line, when empty.
        text: Vec<String>,

        /// Transcribe these WAV recordings instead (16 kHz mono)
        #[arg(short, long, num_args = 1..)]
        audio: Vec<PathBuf>,

        /// Print the reply as JSON
        #[arg(long)]
        json: bool,
    },

    /// Describe an interface screenshot and suggest improvements
    Audit {
        /// Image file or URL
        image: String,

        /// What to focus on
        #[arg(short, long)]
        question: Option<String>,

        /// Print the audit as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show worker slots
    Slots {
        /// Start every slot and print transitions as they happen
        #[arg(long)]
        start: bool,

        /// Print slot states as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
