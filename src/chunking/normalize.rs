//! Text normalization applied before windowing.

use regex::Regex;
use std::sync::OnceLock;

fn hyphen_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Both sides must be word characters so a dash used as punctuation survives.
    RE.get_or_init(|| Regex::new(r"(\w)-[ \t]*\r?\n\s*(\w)").expect("valid hyphenation regex"))
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

/// Normalize raw document text.
///
/// Joins words hyphenated across a line break (`evi-\ndence` becomes
/// `evidence`), collapses every whitespace run to a single space and trims.
pub fn normalize(text: &str) -> String {
    let joined = join_hyphenated(text);
    whitespace_run().replace_all(&joined, " ").trim().to_string()
}

/// A match consumes the first letter after the break, so `a-\nb-\nc` needs
/// a second pass to join `b` and `c`.
fn join_hyphenated(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = hyphen_break().replace_all(&current, "$1$2").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}
