//! Execution channel layer for segment-guard.
//!
//! Provides a trait-based interface over the read-only channel that runs
//! validated SQL, so the Postgres channel and the test channels can be used
//! interchangeably.

mod mock;
mod postgres;
mod types;

pub use mock::{FailingChannel, MockChannel, UnavailableChannel};
pub use postgres::PostgresChannel;
pub use types::{ExecutionResult, Record};

use crate::config::{ConnectionConfig, SandboxConfig};
use crate::error::{Result, SegmentError};
use async_trait::async_trait;

/// Trait defining the interface for read-only execution channels.
///
/// A channel executes exactly one SELECT per call and never writes.
#[async_trait]
pub trait ExecutionChannel: Send + Sync {
    /// Runs a single SELECT and returns its rows as JSON objects.
    async fn run_select(&self, sql: &str) -> Result<Vec<Record>>;

    /// Closes the underlying connection.
    async fn close(&self) -> Result<()>;
}

/// Connects the Postgres channel for the given database and sandbox settings.
pub async fn connect(
    config: &ConnectionConfig,
    sandbox: &SandboxConfig,
) -> Result<Box<dyn ExecutionChannel>> {
    let channel = PostgresChannel::connect(config, sandbox).await?;
    Ok(Box::new(channel))
}

/// Independent SELECT-only check applied by channels before dispatch.
///
/// Channels refuse anything that is not one SELECT statement, whatever the
/// caller did before.
pub fn ensure_read_only_statement(sql: &str) -> Result<()> {
    let trimmed = sql.trim();
    let starts_with_select = trimmed
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
        && !trimmed[6..].starts_with(|c: char| c.is_alphanumeric() || c == '_');

    if !starts_with_select {
        return Err(SegmentError::execution(
            "read-only channel accepts SELECT statements only",
        ));
    }

    if trimmed.trim_end_matches(';').contains(';') {
        return Err(SegmentError::execution(
            "read-only channel accepts a single statement only",
        ));
    }

    Ok(())
}
