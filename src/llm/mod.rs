//! SQL generation for segment-guard.
//!
//! A generator turns a segment description into SQL text. That text is
//! untrusted: the only thing the rest of the crate does with it is hand it
//! to the validator.

pub mod anthropic;
pub mod factory;
mod http;
pub mod mock;
pub mod openai;
pub mod parser;
pub mod prompt;
pub mod types;

pub use anthropic::AnthropicClient;
pub use factory::create_client;
pub use http::ApiConfig;
pub use mock::{FailingLlmClient, MockLlmClient};
pub use openai::OpenAiClient;
pub use parser::extract_sql;
pub use prompt::{build_messages, build_system_prompt};
pub use types::{Message, Role};

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::error::Result;

/// A text generator.
///
/// One call per request, no retries. Failures are `SegmentError::Generation`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the full response text for the given messages.
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// Which generator backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Anthropic,
    /// Canned responses, no network and no key.
    Mock,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Mock => "mock",
        }
    }

    /// Environment variable holding the API key, if the provider needs one.
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Mock => None,
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "mock" => Ok(Self::Mock),
            other => Err(format!(
                "Unknown LLM provider '{other}'. Expected: openai, anthropic or mock"
            )),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
