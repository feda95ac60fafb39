//! UX audit: caption in, three recommendations out.

use crate::config::{AuditPrompts, Prompts};
use crate::generation::{ChatMessage, GenerationParams};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Question used when the caller does not ask one.
pub const DEFAULT_QUESTION: &str = "What should be improved in this interface?";

/// Result of a UX audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UxAudit {
    pub description: String,
    pub advice: String,
    /// `description` and `advice` rendered as a plain-text report.
    pub report: String,
}

impl UxAudit {
    pub fn new(description: String, raw_advice: &str) -> Self {
        let advice = clean_advice(raw_advice);
        let report = render_report(&description, &advice);
        Self {
            description,
            advice,
            report,
        }
    }
}

/// Sampling for the auditor: short, low temperature, discouraged repetition.
pub fn audit_params() -> GenerationParams {
    GenerationParams {
        max_new_tokens: 200,
        temperature: 0.2,
        top_p: None,
        top_k: Some(20),
        repetition_penalty: Some(1.2),
        do_sample: true,
    }
}

/// Build the auditor conversation for a caption and an optional question.
pub fn audit_messages(prompts: &AuditPrompts, description: &str, question: Option<&str>) -> Vec<ChatMessage> {
    let question = question
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or(DEFAULT_QUESTION);

    let mut vars = HashMap::new();
    vars.insert("description".to_string(), description.to_string());
    vars.insert("question".to_string(), question.to_string());

    vec![
        ChatMessage::system(prompts.system.clone()),
        ChatMessage::user(Prompts::render(&prompts.user, &vars)),
    ]
}

fn markup() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*|__|[\u{4e00}-\u{9fa5}]").expect("valid advice regex"))
}

/// Remove bold/underline markers and stray CJK ideographs.
pub fn clean_advice(raw: &str) -> String {
    markup().replace_all(raw, "").trim().to_string()
}

pub fn render_report(description: &str, advice: &str) -> String {
    format!(
        "VISUAL ANALYSIS\n{}\n\nRECOMMENDATIONS\n{}",
        description, advice
    )
}
