//! Answers and chat sessions.

use crate::generation::ChatMessage;
use crate::vector_store::QueryHit;
use serde::Serialize;

/// Answer given when no passage clears the score threshold.
pub const NO_PASSAGES_ANSWER: &str = "I couldn't find any relevant passages in the document for this question.";

/// Messages kept in a chat session's history.
const MAX_HISTORY: usize = 20;

/// An answer with the passages it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// The generated answer.
    pub text: String,
    /// Retrieved passages, best first.
    pub sources: Vec<QueryHit>,
}

impl Answer {
    pub fn no_passages() -> Self {
        Self {
            text: NO_PASSAGES_ANSWER.to_string(),
            sources: Vec::new(),
        }
    }

    /// Format the answer for display.
    pub fn format_for_display(&self) -> String {
        let mut output = self.text.clone();

        if !self.sources.is_empty() {
            output.push_str("\n\n--- Sources ---\n");
            for source in &self.sources {
                output.push_str(&format!(
                    "\n[chunk {}] (score: {:.2}) {}",
                    source.chunk_index,
                    source.score,
                    preview(&source.text, 100)
                ));
            }
        }

        output
    }
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub(crate) fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{}…", head.trim_end())
    }
}

/// Conversation history for follow-up questions.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub(crate) fn record(&mut self, user: ChatMessage, assistant: ChatMessage) {
        self.history.push(user);
        self.history.push(assistant);
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }

    /// Clear conversation history.
    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_sources() {
        let answer = Answer {
            text: "It passed.".to_string(),
            sources: vec![QueryHit {
                chunk_index: 3,
                score: 0.8123,
                text: "The budget passed.".to_string(),
            }],
        };
        let shown = answer.format_for_display();
        assert!(shown.starts_with("It passed."));
        assert!(shown.contains("[chunk 3] (score: 0.81) The budget passed."));
        assert_eq!(Answer::no_passages().format_for_display(), NO_PASSAGES_ANSWER);
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdef", 3), "abc…");
    }

    #[test]
    fn test_history_is_bounded() {
        let mut session = ChatSession::new();
        for i in 0..15 {
            session.record(
                ChatMessage::user(format!("q{}", i)),
                ChatMessage::assistant(format!("a{}", i)),
            );
        }
        assert_eq!(session.history().len(), MAX_HISTORY);
        assert_eq!(session.history()[0].content, "q5");
        session.clear();
        assert!(session.history().is_empty());
    }
}
