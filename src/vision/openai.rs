//! Captioning through an OpenAI-compatible vision chat model.

use super::{clean_caption, Captioner, ImageSource};
use crate::error::{MurmurError, Result};
use crate::openai::{create_client, Endpoint};
use async_openai::types::{
    ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
    ImageUrlArgs,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;
use tracing::{debug, instrument};

/// Instruction sent alongside the image.
pub const DEFAULT_CAPTION_PROMPT: &str =
    "Describe this user interface in detail: layout, text, controls, colors and spacing.";

/// Captioner backed by a multimodal `/chat/completions` endpoint.
pub struct OpenAICaptioner {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    prompt: String,
    max_tokens: u32,
}

impl OpenAICaptioner {
    pub fn with_config(endpoint: &Endpoint, model: &str, max_tokens: u32) -> Result<Self> {
        Ok(Self {
            client: create_client(endpoint)?,
            model: model.to_string(),
            prompt: DEFAULT_CAPTION_PROMPT.to_string(),
            max_tokens,
        })
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = prompt.to_string();
        self
    }

    async fn image_url(image: &ImageSource) -> Result<String> {
        match image {
            ImageSource::Url(url) => Ok(url.clone()),
            ImageSource::Path(path) => {
                let bytes = tokio::fs::read(path).await?;
                Ok(format!(
                    "data:{};base64,{}",
                    mime_for(path),
                    STANDARD.encode(bytes)
                ))
            }
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

#[async_trait]
impl Captioner for OpenAICaptioner {
    #[instrument(skip(self), fields(model = %self.model, image = %image))]
    async fn caption(&self, image: &ImageSource) -> Result<String> {
        let vision_err = |e: async_openai::error::OpenAIError| MurmurError::VisionFailed(e.to_string());
        let url = Self::image_url(image).await?;

        let text_part = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(self.prompt.clone())
            .build()
            .map_err(vision_err)?;
        let image_part = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(
                ImageUrlArgs::default()
                    .url(url)
                    .detail(ImageDetail::Auto)
                    .build()
                    .map_err(vision_err)?,
            )
            .build()
            .map_err(vision_err)?;

        let parts: Vec<ChatCompletionRequestUserMessageContentPart> =
            vec![text_part.into(), image_part.into()];
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(parts)
            .build()
            .map_err(vision_err)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![message.into()])
            .max_tokens(self.max_tokens)
            .temperature(0.0)
            .build()
            .map_err(vision_err)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| MurmurError::VisionFailed(format!("{} API error: {}", self.model, e)))?;

        let raw = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| MurmurError::VisionFailed("Empty response from vision model".to_string()))?;

        let caption = clean_caption(raw);
        debug!("Caption has {} characters", caption.len());
        if caption.is_empty() {
            return Err(MurmurError::VisionFailed(
                "Vision model returned an empty caption".to_string(),
            ));
        }
        Ok(caption)
    }
}
