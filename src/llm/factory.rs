//! Generator construction from configuration.

use tracing::debug;

use crate::error::{Result, SegmentError};
use crate::llm::{
    AnthropicClient, ApiConfig, LlmClient, LlmProvider, MockLlmClient, OpenAiClient,
};
use crate::llm::anthropic::ANTHROPIC_API_URL;
use crate::llm::openai::OPENAI_API_URL;

/// Creates the generator for `provider`.
///
/// The key comes from `api_key` or the provider's environment variable.
/// `OPENAI_BASE_URL` points the OpenAI client at a compatible endpoint.
pub fn create_client(
    provider: LlmProvider,
    model: &str,
    api_key: Option<String>,
) -> Result<Box<dyn LlmClient>> {
    let Some(key_var) = provider.api_key_var() else {
        return Ok(Box::new(MockLlmClient::new()));
    };

    let key = api_key
        .or_else(|| std::env::var(key_var).ok())
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| SegmentError::config(format!("No API key configured. Set {key_var}.")))?;

    match provider {
        LlmProvider::OpenAi => {
            let endpoint = match std::env::var("OPENAI_BASE_URL") {
                Ok(base) => format!("{}/chat/completions", base.trim_end_matches('/')),
                Err(_) => OPENAI_API_URL.to_string(),
            };
            debug!(endpoint = %endpoint, model, "Creating OpenAI generator");
            Ok(Box::new(OpenAiClient::new(ApiConfig::new(key, model, endpoint))?))
        }
        LlmProvider::Anthropic => {
            debug!(model, "Creating Anthropic generator");
            Ok(Box::new(AnthropicClient::new(ApiConfig::new(
                key,
                model,
                ANTHROPIC_API_URL,
            ))?))
        }
        LlmProvider::Mock => Ok(Box::new(MockLlmClient::new())),
    }
}
