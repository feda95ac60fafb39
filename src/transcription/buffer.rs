//! Rolling transcript of recognized utterances.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Utterances the assistant sees at once.
pub const DEFAULT_WINDOW: usize = 8;

/// A recognized piece of speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub at: DateTime<Local>,
}

/// Full history plus a rolling window of the most recent utterances.
#[derive(Debug, Clone)]
pub struct TranscriptBuffer {
    history: Vec<Utterance>,
    window: VecDeque<Utterance>,
    capacity: usize,
}

impl TranscriptBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: Vec::new(),
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Record an utterance. Blank text is ignored.
    pub fn push(&mut self, text: &str) -> Option<&Utterance> {
        self.push_at(text, Local::now())
    }

    pub fn push_at(&mut self, text: &str, at: DateTime<Local>) -> Option<&Utterance> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let utterance = Utterance {
            text: text.to_string(),
            at,
        };
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(utterance.clone());
        self.history.push(utterance);
        self.history.last()
    }

    pub fn history(&self) -> &[Utterance] {
        &self.history
    }

    pub fn window(&self) -> impl Iterator<Item = &Utterance> {
        self.window.iter()
    }

    /// The window joined with spaces, oldest first.
    pub fn context_text(&self) -> String {
        self.window
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.window.clear();
    }
}

impl Default for TranscriptBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
