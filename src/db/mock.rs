//! Mock execution channels for testing.
//!
//! Provides in-memory channels for headless testing and the `--mock-db` flag.

use super::{ensure_read_only_statement, ExecutionChannel, Record};
use crate::error::{Result, SegmentError};
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use std::sync::{Mutex, OnceLock};

/// A mock channel that returns predefined rows.
///
/// Records every statement it receives. If the statement carries a
/// `tenant_id = '<t>'` predicate, only rows whose `tenant_id` field matches
/// are returned, which lets tests observe tenant isolation end to end.
#[derive(Debug, Default)]
pub struct MockChannel {
    rows: Vec<Record>,
    statements: Mutex<Vec<String>>,
}

impl MockChannel {
    /// Creates a mock channel with no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock channel returning the given rows.
    pub fn with_rows(rows: Vec<Record>) -> Self {
        Self {
            rows,
            statements: Mutex::new(Vec::new()),
        }
    }

    /// Creates a mock channel with a few patients spread over two tenants.
    pub fn with_sample_patients() -> Self {
        let patients = [
            ("p-001", "Ada Lovelace", "t1"),
            ("p-002", "Grace Hopper", "t1"),
            ("p-003", "Alan Turing", "t2"),
            ("p-004", "Edsger Dijkstra", "t2"),
            ("p-005", "Barbara Liskov", "t1"),
        ];
        let rows = patients
            .iter()
            .filter_map(|(id, name, tenant)| {
                json!({ "patient_id": id, "name": name, "tenant_id": tenant })
                    .as_object()
                    .cloned()
            })
            .collect();
        Self::with_rows(rows)
    }

    /// Returns every statement received so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Returns the last statement received.
    pub fn last_statement(&self) -> Option<String> {
        self.statements().pop()
    }
}

/// Extracts the tenant from the first `tenant_id = '<t>'` predicate.
fn tenant_filter(sql: &str) -> Option<String> {
    static TENANT: OnceLock<Regex> = OnceLock::new();
    let re = TENANT.get_or_init(|| {
        Regex::new(r"tenant_id\s*=\s*'((?:[^']|'')*)'").expect("valid regex")
    });
    re.captures(sql)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace("''", "'"))
}

#[async_trait]
impl ExecutionChannel for MockChannel {
    async fn run_select(&self, sql: &str) -> Result<Vec<Record>> {
        ensure_read_only_statement(sql)?;

        if let Ok(mut statements) = self.statements.lock() {
            statements.push(sql.to_string());
        }

        let rows = match tenant_filter(sql) {
            Some(tenant) => self
                .rows
                .iter()
                .filter(|row| row.get("tenant_id").and_then(|v| v.as_str()) == Some(&tenant))
                .cloned()
                .collect(),
            None => self.rows.clone(),
        };
        Ok(rows)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A channel whose server-side function is not installed.
#[derive(Debug, Default)]
pub struct UnavailableChannel;

#[async_trait]
impl ExecutionChannel for UnavailableChannel {
    async fn run_select(&self, _sql: &str) -> Result<Vec<Record>> {
        Err(SegmentError::setup_required(
            "function execute_readonly_query(text) does not exist",
        ))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A channel that always fails with an execution error.
#[derive(Debug)]
pub struct FailingChannel {
    message: String,
}

impl FailingChannel {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for FailingChannel {
    fn default() -> Self {
        Self::new("ERROR: canceling statement due to statement timeout")
    }
}

#[async_trait]
impl ExecutionChannel for FailingChannel {
    async fn run_select(&self, _sql: &str) -> Result<Vec<Record>> {
        Err(SegmentError::execution(self.message.clone()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
