//! Query and context construction.

use crate::config::Prompts;
use crate::vector_store::QueryHit;
use std::collections::HashMap;

/// Separator between quoted passages.
const PASSAGE_SEPARATOR: &str = "\n\n";

/// Wrap a question in the retrieval template before it is embedded.
///
/// `{{question}}` marks where the question goes. A template without the
/// placeholder gets the question appended; an empty one embeds the question
/// as is.
pub fn render_query(template: &str, question: &str) -> String {
    let question = question.trim();
    if template.trim().is_empty() {
        return question.to_string();
    }
    if !template.contains("{{question}}") {
        return format!("{} {}", template.trim(), question);
    }
    let mut vars = HashMap::new();
    vars.insert("question".to_string(), question.to_string());
    Prompts::render(template, &vars)
}

/// Join the text of the best hits into a prompt context.
///
/// Takes at most `max_chunks` hits in rank order and stops at `max_chars`
/// characters, cutting the last passage if needed.
pub fn build_context(hits: &[QueryHit], max_chunks: usize, max_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0;

    for hit in hits.iter().take(max_chunks) {
        let separator = if context.is_empty() { "" } else { PASSAGE_SEPARATOR };
        let needed = separator.chars().count() + hit.text.chars().count();

        if used + needed <= max_chars {
            context.push_str(separator);
            context.push_str(&hit.text);
            used += needed;
            continue;
        }

        let room = max_chars.saturating_sub(used + separator.chars().count());
        if room > 0 {
            context.push_str(separator);
            context.extend(hit.text.chars().take(room));
        }
        break;
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(index: usize, text: &str) -> QueryHit {
        QueryHit {
            chunk_index: index,
            score: 1.0 - index as f32 * 0.1,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_render_query() {
        let template = "Question: {{question}}. Answer using the document.";
        assert_eq!(
            render_query(template, " What changed? "),
            "Question: What changed?. Answer using the document."
        );
        assert_eq!(render_query("{{question}}", "raw"), "raw");
        assert_eq!(render_query("", "raw"), "raw");
        assert_eq!(render_query("query:", "raw"), "query: raw");
    }

    #[test]
    fn test_context_takes_best_hits() {
        let hits = vec![hit(0, "alpha"), hit(1, "beta"), hit(2, "gamma")];
        assert_eq!(build_context(&hits, 2, 1000), "alpha\n\nbeta");
        assert_eq!(build_context(&hits, 5, 1000), "alpha\n\nbeta\n\ngamma");
        assert_eq!(build_context(&[], 2, 1000), "");
    }

    #[test]
    fn test_context_respects_char_budget() {
        let hits = vec![hit(0, "abcdef"), hit(1, "ghijkl")];
        assert_eq!(build_context(&hits, 2, 4), "abcd");
        assert_eq!(build_context(&hits, 2, 10), "abcdef\n\ngh");
        assert_eq!(build_context(&hits, 2, 7), "abcdef");
    }

    #[test]
    fn test_context_counts_chars_not_bytes() {
        let hits = vec![hit(0, "ñandú")];
        assert_eq!(build_context(&hits, 1, 3), "ñan");
    }
}
