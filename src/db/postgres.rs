//! PostgreSQL execution channel.
//!
//! Provides the `PostgresChannel` struct that implements the
//! `ExecutionChannel` trait using sqlx. Every statement runs inside a
//! `READ ONLY` transaction with a local statement timeout, and only through
//! the server-side function configured in `[sandbox]`.

use crate::config::{describe, ConnectionConfig, SandboxConfig};
use crate::db::{ensure_read_only_statement, ExecutionChannel, Record};
use crate::error::{Result, SegmentError};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Extra time allowed on top of the server-side statement timeout.
const CLIENT_TIMEOUT_GRACE_SECS: u64 = 5;

/// SQLSTATE codes meaning the channel itself is not set up.
const SETUP_SQLSTATES: &[&str] = &[
    "42883", // undefined_function
    "3F000", // invalid_schema_name
    "42501", // insufficient_privilege
];

/// PostgreSQL read-only channel.
#[derive(Debug)]
pub struct PostgresChannel {
    pool: PgPool,
    sandbox: SandboxConfig,
}

impl PostgresChannel {
    /// Connects to the database. A failed connection means no channel.
    pub async fn connect(config: &ConnectionConfig, sandbox: &SandboxConfig) -> Result<Self> {
        sandbox.validate()?;
        let options = config.connect_options()?;
        let target = describe(&options);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options.clone())
            .await
            .map_err(|e| map_connection_error(e, &options))?;

        debug!(target = %target, "Connected read-only channel");
        Ok(Self::from_pool(pool, sandbox.clone()))
    }

    /// Creates a channel from an existing connection pool.
    ///
    /// This is primarily useful for testing.
    pub fn from_pool(pool: PgPool, sandbox: SandboxConfig) -> Self {
        Self { pool, sandbox }
    }

    async fn run_in_read_only_tx(&self, sql: &str) -> std::result::Result<Option<serde_json::Value>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;

        let timeout = format!(
            "SET LOCAL statement_timeout = {}",
            self.sandbox.statement_timeout_millis()
        );
        sqlx::query(&timeout).execute(&mut *tx).await?;

        let call = format!("SELECT {}($1)", self.sandbox.readonly_function);
        let value = sqlx::query_scalar::<_, Option<serde_json::Value>>(&call)
            .bind(sql)
            .fetch_one(&mut *tx)
            .await?;

        // Nothing to keep from a read-only transaction.
        tx.rollback().await?;
        Ok(value)
    }
}

#[async_trait]
impl ExecutionChannel for PostgresChannel {
    async fn run_select(&self, sql: &str) -> Result<Vec<Record>> {
        ensure_read_only_statement(sql)?;

        let start = Instant::now();
        let limit = self
            .sandbox
            .statement_timeout_secs
            .saturating_add(CLIENT_TIMEOUT_GRACE_SECS);

        let value = tokio::time::timeout(Duration::from_secs(limit), self.run_in_read_only_tx(sql))
            .await
            .map_err(|_| SegmentError::execution(format!("Query timed out after {limit} seconds")))?
            .map_err(|e| map_query_error(e, &self.sandbox.readonly_function))?;

        let rows = json_to_records(value)?;
        info!(
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Read-only channel returned"
        );
        Ok(rows)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Converts the function's jsonb result into records.
///
/// NULL is an empty result; anything but an array of objects is an error.
fn json_to_records(value: Option<serde_json::Value>) -> Result<Vec<Record>> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::Object(map) => Ok(map),
                other => Err(SegmentError::execution(format!(
                    "read-only channel returned a non-object row: {other}"
                ))),
            })
            .collect(),
        Some(other) => Err(SegmentError::execution(format!(
            "read-only channel returned {} instead of an array",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Maps query errors, separating setup problems from execution failures.
fn map_query_error(error: sqlx::Error, function: &str) -> SegmentError {
    let code = error
        .as_database_error()
        .and_then(|db| db.code())
        .map(|c| c.into_owned());

    match code.as_deref() {
        Some(code) if SETUP_SQLSTATES.contains(&code) => SegmentError::setup_required(format!(
            "read-only function {function}(text) is missing or not executable: {}",
            format_query_error(error)
        )),
        _ if matches!(error, sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => {
            SegmentError::setup_required(format!("database unavailable: {error}"))
        }
        _ => SegmentError::execution(format_query_error(error)),
    }
}

/// Maps sqlx connection errors to setup messages. No retries are made.
fn map_connection_error(error: sqlx::Error, options: &PgConnectOptions) -> SegmentError {
    let host = options.get_host();
    let port = options.get_port();
    let user = options.get_username();
    let database = options.get_database().unwrap_or(user);

    let error_str = error.to_string().to_lowercase();

    let message = if error_str.contains("connection refused") || error_str.contains("could not connect") {
        format!("Cannot connect to {host}:{port}. Check that the server is running.")
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        format!("Authentication failed for user '{user}'. Check your credentials.")
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        format!("Database '{database}' does not exist.")
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        format!("Connection to {host}:{port} timed out. The server may be overloaded or unreachable.")
    } else {
        error.to_string()
    };

    SegmentError::setup_required(message)
}

/// Formats a query error with detail and hint if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
