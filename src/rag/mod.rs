//! Retrieval-augmented question answering over one document.
//!
//! [`RagPipeline`] owns the document lifecycle: chunk, embed, commit, then
//! answer questions from the committed index with cited passages.
//!
//! ```text
//! Idle ──► Indexing ──► Indexed ◄──► Querying
//!              │           ▲            │
//!              ▼           │            ▼
//!            Failed ───────┴────────  Failed
//! ```

mod context;
mod pipeline;
mod response;

pub use context::{build_context, render_query};
pub use pipeline::{PipelineState, RagPipeline, RetrievalOptions};
pub use response::{Answer, ChatSession, NO_PASSAGES_ANSWER};
