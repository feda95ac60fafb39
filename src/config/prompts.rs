//! Prompt templates for Murmur.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use crate::perspectives::Perspective;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    pub rag: RagPrompts,
    /// Personas for the perspective assistant.
    pub assistant: AssistantPrompts,
    pub audit: AuditPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for document question answering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagPrompts {
    /// Optional system message. Empty sends the question prompt alone.
    pub system: String,
    pub user: String,
    pub chat_system: String,
}

impl Default for RagPrompts {
    fn default() -> Self {
        Self {
            system: "Answer the question using only the provided context. \
If the context does not contain the answer, say so plainly."
                .to_string(),
            user: "Question: {{question}}\nContext: {{context}}\nAnswer:".to_string(),
            chat_system: r#"You are a helpful assistant for exploring a single document.

In this conversation:
- Answer using the passages provided with each question
- Remember previous questions for follow-ups
- If something is not in the document, say so honestly"#
                .to_string(),
        }
    }
}

/// System prompts for each perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantPrompts {
    /// Zero-shot hypothesis; `{}` is replaced by the perspective label.
    pub hypothesis_template: String,
    pub facts: String,
    pub feelings: String,
    pub risks: String,
    pub benefits: String,
    pub creativity: String,
    pub process: String,
}

const CONVERSATIONAL: &str = "Speak directly to the person you are talking with, \
as 'you'. Never refer to them as 'the user' or mention 'the input'. Keep it short.";

impl Default for AssistantPrompts {
    fn default() -> Self {
        let persona = |focus: &str| format!("{} {}", focus, CONVERSATIONAL);
        Self {
            hypothesis_template: crate::perspectives::DEFAULT_HYPOTHESIS.to_string(),
            facts: persona(
                "You are an analytical, fact-focused partner in a brainstorming conversation. \
Point out what is known, what is still unclear, and ask questions that pin down the data.",
            ),
            feelings: persona(
                "You are an emotionally aware partner in a brainstorming conversation. \
Notice the feelings behind what is being said and acknowledge them gently.",
            ),
            risks: persona(
                "You are a cautious, critical partner in a brainstorming conversation. \
Name the weak spots and what could go wrong, and stay constructive.",
            ),
            benefits: persona(
                "You are an optimistic partner in a brainstorming conversation. \
Highlight what is promising and where the opportunities are, realistically.",
            ),
            creativity: persona(
                "You are a creative, lateral-thinking partner in a brainstorming conversation. \
Offer fresh alternatives and unexpected angles on the idea.",
            ),
            process: persona(
                "You are an organized partner in a brainstorming conversation. \
Summarize the key points so far, spot patterns, and suggest the next step.",
            ),
        }
    }
}

impl AssistantPrompts {
    pub fn persona(&self, perspective: Perspective) -> &str {
        match perspective {
            Perspective::Facts => &self.facts,
            Perspective::Feelings => &self.feelings,
            Perspective::Risks => &self.risks,
            Perspective::Benefits => &self.benefits,
            Perspective::Creativity => &self.creativity,
            Perspective::Process => &self.process,
        }
    }
}

/// Prompts for the UX audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditPrompts {
    pub system: String,
    pub user: String,
}

impl Default for AuditPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a strict UX auditor.
Task: analyze the described UI element and list 3 specific improvements.

Constraints:
- Do not invent features that are not described.
- Stay technical: contrast, spacing, labeling, usability.
- English only.
- At most 15 words per point.
- Output exactly one list of the 3 improvements."#
                .to_string(),
            user: "UI element description: \"{{description}}\"\nQuestion: \"{{question}}\"\n\nProvide 3 actionable recommendations:"
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let rag_path = custom_path.join("rag.toml");
            if rag_path.exists() {
                let content = std::fs::read_to_string(&rag_path)?;
                prompts.rag = toml::from_str(&content)?;
            }

            let assistant_path = custom_path.join("assistant.toml");
            if assistant_path.exists() {
                let content = std::fs::read_to_string(&assistant_path)?;
                prompts.assistant = toml::from_str(&content)?;
            }

            let audit_path = custom_path.join("audit.toml");
            if audit_path.exists() {
                let content = std::fs::read_to_string(&audit_path)?;
                prompts.audit = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
