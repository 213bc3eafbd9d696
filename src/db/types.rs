//! Execution result types.
//!
//! The read-only channel returns each row as a JSON object keyed by column
//! name, so records stay untyped until the response is shaped.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single result row as returned by the channel.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Rows returned by one execution, in channel order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Result rows, at most the row cap.
    pub rows: Vec<Record>,

    /// Number of rows in `rows`.
    pub count: usize,

    /// Time taken by the channel.
    #[serde(with = "duration_serde")]
    pub execution_time: Duration,

    /// Whether the channel returned more rows than the cap allows.
    #[serde(default)]
    pub was_truncated: bool,
}

impl ExecutionResult {
    /// Creates a result from the given rows.
    pub fn from_rows(rows: Vec<Record>) -> Self {
        let count = rows.len();
        Self {
            rows,
            count,
            execution_time: Duration::ZERO,
            was_truncated: false,
        }
    }

    /// Sets the execution time.
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.execution_time = duration;
        self
    }

    /// Drops rows beyond `cap`, recording whether any were dropped.
    pub fn truncate_to(mut self, cap: usize) -> Self {
        if self.rows.len() > cap {
            self.rows.truncate(cap);
            self.was_truncated = true;
        }
        self.count = self.rows.len();
        self
    }

    /// Returns true if no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Serde support for Duration as milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
