//! Murmur - document and conversation assistant
//!
//! A local-first pipeline that indexes a document or a running speech
//! transcript, retrieves the passages most relevant to a question and hands
//! them to a generator. A fixed set of inference workers (speech
//! recognition, classification and generation, vision captioning,
//! embedding) share one constrained accelerator; a scheduler serializes
//! their lifecycles so they never contend for it.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration and prompt templates
//! - `chunking` - Text normalization and overlapping character windows
//! - `embedding` - Embedding generation
//! - `vector_store` - In-memory index with atomically swapped snapshots
//! - `generation` - Text generation backends
//! - `rag` - Document lifecycle and question answering
//! - `scheduler` - Worker slots and accelerator reservation
//! - `transcription` - Speech-to-text and the transcript buffer
//! - `perspectives` - Zero-shot perspective assistant
//! - `vision` - Image captioning and UX audits
//! - `orchestrator` - Wires everything through the scheduler
//!
//! # Example
//!
//! ```rust,no_run
//! use murmur::config::Settings;
//! use murmur::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = Orchestrator::new(Settings::load()?)?;
//!
//!     orchestrator
//!         .index_document("The budget was approved in March.", None)
//!         .await?;
//!     let answer = orchestrator.ask("When was the budget approved?", None).await?;
//!     println!("{}", answer.format_for_display());
//!
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod openai;
pub mod orchestrator;
pub mod perspectives;
pub mod rag;
pub mod scheduler;
pub mod transcription;
pub mod vector_store;
pub mod vision;

pub use error::{MurmurError, Result};
