//! Screenshot captioning and UX audits.
//!
//! A [`Captioner`] turns an image into a detailed description. The audit
//! then hands that description to the text generator for concrete
//! interface recommendations.

mod audit;
mod openai;

pub use audit::{audit_messages, audit_params, clean_advice, render_report, UxAudit};
pub use openai::OpenAICaptioner;

use crate::error::Result;
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// `http(s)://` or `data:` URL, passed through as is.
    Url(String),
    /// Local file, read and inlined when captioned.
    Path(PathBuf),
}

impl ImageSource {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.starts_with("http://")
            || trimmed.starts_with("https://")
            || trimmed.starts_with("data:")
        {
            ImageSource::Url(trimmed.to_string())
        } else {
            ImageSource::Path(PathBuf::from(shellexpand::tilde(trimmed).to_string()))
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Url(url) if url.starts_with("data:") => f.write_str("<inline image>"),
            ImageSource::Url(url) => f.write_str(url),
            ImageSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Trait for image captioning.
#[async_trait]
pub trait Captioner: Send + Sync {
    /// Describe the image in detail.
    async fn caption(&self, image: &ImageSource) -> Result<String>;
}

fn caption_tokens() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"</?s>|<MORE_DETAILED_CAPTION>").expect("valid caption token regex")
    })
}

/// Strip sequence and task tokens some captioning models leave in their
/// output.
pub fn clean_caption(raw: &str) -> String {
    caption_tokens().replace_all(raw, "").trim().to_string()
}
