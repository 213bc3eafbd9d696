//! Deterministic generators for tests and the `mock` provider.
//!
//! Some canned responses are deliberately hostile so the safety layer can be
//! exercised end to end without a real model.

use async_trait::async_trait;

use crate::error::{Result, SegmentError};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Canned responses. The first entry whose keywords all appear in the
/// lower-cased description wins.
const CANNED: &[(&[&str], &str)] = &[
    (
        &["born before 2000"],
        "```sql\nSELECT p.patient_id, p.name FROM patients p WHERE p.birth_date < '2000-01-01'\n```",
    ),
    (
        &["reorder", "due"],
        "```sql\nSELECT p.patient_id, p.name FROM patients p\nJOIN reorders r ON r.patient_id = p.patient_id\nWHERE r.due_date <= CURRENT_DATE\n```",
    ),
    (
        &["all patients"],
        "```sql\nSELECT p.patient_id, p.name FROM patients p ORDER BY p.name;\n```",
    ),
    (&["drop"], "```sql\nDROP TABLE patients;\n```"),
    (
        &["slow"],
        "```sql\nSELECT pg_sleep(30), p.patient_id FROM patients p\n```",
    ),
    (&["admin"], "```sql\nSELECT * FROM admin_users\n```"),
];

/// Reply when nothing matches. Prose, so validation rejects it.
const FALLBACK: &str = "I can only describe patient segments. Could you rephrase the request?";

/// Generator answering from a fixed table, plus any overrides.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    overrides: Vec<(String, String)>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `response` for any description containing `pattern`.
    /// Overrides are checked before the built-in table.
    pub fn with_response(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.overrides
            .push((pattern.into().to_lowercase(), response.into()));
        self
    }

    fn respond(&self, description: &str) -> &str {
        let description = description.to_lowercase();

        if let Some((_, response)) = self
            .overrides
            .iter()
            .find(|(pattern, _)| description.contains(pattern.as_str()))
        {
            return response;
        }

        CANNED
            .iter()
            .find(|(keywords, _)| keywords.iter().all(|k| description.contains(k)))
            .map_or(FALLBACK, |(_, response)| *response)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let description = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map_or("", |m| m.content.as_str());
        Ok(self.respond(description).to_string())
    }
}

/// Generator that always fails, standing in for an unreachable provider.
#[derive(Debug, Clone, Default)]
pub struct FailingLlmClient;

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String> {
        Err(SegmentError::generation("Failed to connect to OpenAI API."))
    }
}
