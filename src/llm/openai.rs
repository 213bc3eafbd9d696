//! OpenAI chat completions generator.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SegmentError};
use crate::llm::http::{self, ApiConfig};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// OpenAI chat completions endpoint.
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const PROVIDER: &str = "OpenAI";

/// Generator backed by OpenAI or any endpoint speaking the same protocol.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: ApiConfig,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self { config, client })
    }

    /// Creates a client for the public OpenAI endpoint.
    pub fn with_key(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::new(ApiConfig::new(api_key, model, OPENAI_API_URL))
    }

    /// Returns the endpoint requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn first_choice(response: ChatResponse) -> Result<String> {
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SegmentError::generation("No response from OpenAI"))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
        };

        debug!(model = %self.config.model, "Sending OpenAI completion request");

        let builder = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request);
        let body = http::send(PROVIDER, builder).await?;

        Self::first_choice(http::parse_body(PROVIDER, &body)?)
    }
}

// `Message` already serializes as `{"role": ..., "content": ...}`.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
