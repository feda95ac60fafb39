//! Offline extractive generator.
//!
//! Answers by quoting the first sentences of the retrieved context. Useful
//! when no language model is available: the answer is always grounded in
//! the document, just not rephrased.

use super::{ChatMessage, GenerationParams, Generator, Role};
use crate::error::{MurmurError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

/// Maximum answer length in characters.
const MAX_ANSWER_CHARS: usize = 420;
/// Maximum number of sentences quoted.
const MAX_SENTENCES: usize = 3;

fn split_hyphen() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w)-\s+(\w)").expect("valid hyphen regex"))
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

/// Generator that extracts an answer from the prompt's context section.
#[derive(Debug, Clone)]
pub struct ExtractiveGenerator {
    context_marker: String,
    answer_marker: String,
}

impl ExtractiveGenerator {
    pub fn new() -> Self {
        Self {
            context_marker: "Context:".to_string(),
            answer_marker: "\nAnswer:".to_string(),
        }
    }

    /// Pull the context section out of a rendered prompt, or the whole prompt
    /// if the markers are missing.
    fn context_of<'a>(&self, prompt: &'a str) -> &'a str {
        let Some(start) = prompt.find(&self.context_marker) else {
            return prompt;
        };
        let body = &prompt[start + self.context_marker.len()..];
        match body.rfind(&self.answer_marker) {
            Some(end) => &body[..end],
            None => body,
        }
    }

    /// Build a short answer from the leading sentences of `context`.
    pub fn summarize(context: &str) -> String {
        let cleaned = split_hyphen().replace_all(context, "$1$2");
        let cleaned = whitespace_run().replace_all(&cleaned, " ").trim().to_string();
        if cleaned.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        for (i, sentence) in split_sentences(&cleaned).into_iter().enumerate() {
            let candidate = if out.is_empty() {
                sentence.to_string()
            } else {
                format!("{} {}", out, sentence)
            };
            if candidate.chars().count() > MAX_ANSWER_CHARS {
                break;
            }
            out = candidate;
            if i + 1 >= MAX_SENTENCES {
                break;
            }
        }

        if out.is_empty() {
            out = cleaned.chars().take(MAX_ANSWER_CHARS).collect();
        }

        if out.chars().count() < cleaned.chars().count() {
            out.push('…');
        }
        out
    }
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Split after `.`, `!` or `?` when followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_i, next_c)) = chars.peek() {
                if next_c.is_whitespace() {
                    sentences.push(text[start..next_i].trim());
                    start = next_i;
                }
            } else {
                sentences.push(text[start..i + c.len_utf8()].trim());
                start = text.len();
            }
        }
    }
    if start < text.len() {
        sentences.push(text[start..].trim());
    }
    sentences.retain(|s| !s.is_empty());
    sentences
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    async fn generate(&self, messages: &[ChatMessage], _params: &GenerationParams) -> Result<String> {
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .ok_or_else(|| MurmurError::GenerationFailed("No user message to answer".to_string()))?;

        let answer = Self::summarize(self.context_of(prompt));
        if answer.is_empty() {
            return Err(MurmurError::GenerationFailed(
                "No context to extract an answer from".to_string(),
            ));
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One. Two! Three? Four"),
            vec!["One.", "Two!", "Three?", "Four"]
        );
        assert_eq!(split_sentences("v1.2 is out."), vec!["v1.2 is out."]);
    }

    #[test]
    fn test_summary_keeps_three_sentences() {
        let answer = ExtractiveGenerator::summarize("A one. B two. C three. D four.");
        assert_eq!(answer, "A one. B two. C three.…");
    }

    #[test]
    fn test_summary_respects_length_limit() {
        let long = "word ".repeat(200);
        let answer = ExtractiveGenerator::summarize(&long);
        assert!(answer.ends_with('…'));
        assert_eq!(answer.chars().count(), MAX_ANSWER_CHARS + 1);
    }

    #[test]
    fn test_summary_joins_split_words() {
        assert_eq!(
            ExtractiveGenerator::summarize("La eviden-  cia es clara."),
            "La evidencia es clara."
        );
    }

    #[tokio::test]
    async fn test_generate_uses_context_section() {
        let generator = ExtractiveGenerator::new();
        let messages = vec![ChatMessage::user(
            "Question: What was approved?\nContext: The budget was approved. It passed easily.\nAnswer:",
        )];
        let answer = generator
            .generate(&messages, &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(answer, "The budget was approved. It passed easily.");
    }

    #[tokio::test]
    async fn test_generate_without_user_message_fails() {
        let generator = ExtractiveGenerator::new();
        let result = generator
            .generate(&[ChatMessage::system("hi")], &GenerationParams::default())
            .await;
        assert!(matches!(result, Err(MurmurError::GenerationFailed(_))));
    }
}
