//! OpenAI-compatible chat completion generator.

use super::{ChatMessage, GenerationParams, Generator, Role};
use crate::error::{MurmurError, Result};
use crate::openai::{create_client, Endpoint};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Generator backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAIGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl OpenAIGenerator {
    /// Create a generator for the given endpoint and model.
    pub fn with_config(endpoint: &Endpoint, model: &str) -> Result<Self> {
        Ok(Self {
            client: create_client(endpoint)?,
            model: model.to_string(),
        })
    }

    fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
        let map_err = |e: async_openai::error::OpenAIError| MurmurError::GenerationFailed(e.to_string());
        Ok(match message.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(map_err)?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(map_err)?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(map_err)?
                .into(),
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    #[instrument(skip(self, messages, params), fields(model = %self.model, messages = messages.len()))]
    async fn generate(&self, messages: &[ChatMessage], params: &GenerationParams) -> Result<String> {
        let request_messages = messages
            .iter()
            .map(Self::to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let temperature = if params.do_sample { params.temperature } else { 0.0 };

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(request_messages)
            .temperature(temperature)
            .max_tokens(params.max_new_tokens);
        if let Some(top_p) = params.top_p {
            args.top_p(top_p);
        }

        let request = args
            .build()
            .map_err(|e| MurmurError::GenerationFailed(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            MurmurError::GenerationFailed(format!("Failed to generate response: {}", e))
        })?;

        let answer = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| MurmurError::GenerationFailed("Empty response from LLM".to_string()))?
            .clone();

        debug!("Generated {} characters", answer.len());
        Ok(answer)
    }
}
