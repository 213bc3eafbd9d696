//! Anthropic Messages API generator.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SegmentError};
use crate::llm::http::{self, ApiConfig};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Anthropic Messages endpoint.
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version header.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A single SELECT never needs more than this.
const MAX_TOKENS: u32 = 1024;

const PROVIDER: &str = "Anthropic";

/// Generator backed by Anthropic.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    config: ApiConfig,
    client: Client,
}

impl AnthropicClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self { config, client })
    }

    /// Creates a client for the public Anthropic endpoint.
    pub fn with_key(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::new(ApiConfig::new(api_key, model, ANTHROPIC_API_URL))
    }

    /// Builds the request body. The system prompt is a separate field here.
    fn build_request<'a>(&'a self, messages: &'a [Message]) -> MessagesRequest<'a> {
        let system = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .last();

        MessagesRequest {
            model: &self.config.model,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            system,
            messages: messages.iter().filter(|m| m.role != Role::System).collect(),
        }
    }

    /// Joins the text blocks of a response.
    fn collect_text(response: MessagesResponse) -> Result<String> {
        let text: String = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();

        if text.is_empty() {
            return Err(SegmentError::generation("No response from Anthropic"));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = self.build_request(messages);

        debug!(model = %self.config.model, "Sending Anthropic completion request");

        let builder = self
            .client
            .post(&self.config.endpoint)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request);
        let body = http::send(PROVIDER, builder).await?;

        Self::collect_text(http::parse_body(PROVIDER, &body)?)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<&'a Message>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}
