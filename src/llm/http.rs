//! HTTP plumbing shared by the hosted generators.
//!
//! Both providers take a JSON body, answer with JSON, and report failures as
//! `{"error": {"message": ...}}`. Everything that goes wrong here is a
//! generation failure; the caller only ever sees a generic message.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SegmentError};

/// Default timeout for a single generation request.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings for one hosted generator.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Model to use (e.g., "gpt-5", "claude-3-5-sonnet-latest").
    pub model: String,
    /// Full URL of the completion endpoint.
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            endpoint: endpoint.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Builds the reqwest client for these settings.
    pub(crate) fn http_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| SegmentError::generation(format!("Failed to create HTTP client: {}", e)))
    }
}

/// Sends a prepared request and returns the body of a successful response.
pub(crate) async fn send(provider: &str, request: RequestBuilder) -> Result<String> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            SegmentError::generation(format!("Request to {provider} timed out."))
        } else if e.is_connect() {
            SegmentError::generation(format!("Failed to connect to {provider} API."))
        } else {
            SegmentError::generation(format!("Request to {provider} failed: {e}"))
        }
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| SegmentError::generation(format!("Failed to read {provider} response: {e}")))?;

    debug!(provider, status = status.as_u16(), body_len = body.len(), "Generator responded");

    if !status.is_success() {
        return Err(api_error(provider, status, &body));
    }
    Ok(body)
}

/// Parses a JSON response body.
pub(crate) fn parse_body<'a, T: Deserialize<'a>>(provider: &str, body: &'a str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| SegmentError::generation(format!("Failed to parse {provider} response: {e}")))
}

/// Maps an unsuccessful status and its body to a generation error.
pub(crate) fn api_error(provider: &str, status: StatusCode, body: &str) -> SegmentError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SegmentError::generation(format!("Authentication failed. Check the {provider} API key."))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            SegmentError::generation(format!("Rate limited by {provider}."))
        }
        _ => match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => {
                SegmentError::generation(format!("{provider} API error: {}", parsed.error.message))
            }
            Err(_) => SegmentError::generation(format!("{provider} API error ({status}): {body}")),
        },
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
