//! Execution gate.
//!
//! The only path from validated SQL to the database. It caps the row count,
//! dispatches to the configured read-only channel and fails closed when no
//! channel is configured.

use std::time::Instant;

use tracing::{info, warn};

use crate::db::{ExecutionChannel, ExecutionResult};
use crate::error::{Result, SegmentError};
use crate::safety::tokenizer::tokenize;

/// Maximum rows any execution may return.
pub const ROW_CAP: usize = 1000;

/// Applies the row cap to a statement.
///
/// Without a top-level LIMIT or FETCH, ` LIMIT 1000` is appended. Otherwise
/// the statement is wrapped so that its own (possibly tighter) limit still
/// binds and the cap applies on top of it.
pub fn apply_row_cap(sql: &str) -> Result<String> {
    let body = sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());

    let tokens = tokenize(body).map_err(|e| {
        SegmentError::validation(format!("unsupported SQL construct: {}", e), body)
    })?;

    let has_limit = tokens
        .iter()
        .any(|t| t.depth == 0 && (t.is_keyword(body, "LIMIT") || t.is_keyword(body, "FETCH")));

    Ok(if has_limit {
        format!("SELECT * FROM ({body}) AS row_capped LIMIT {ROW_CAP}")
    } else {
        format!("{body} LIMIT {ROW_CAP}")
    })
}

/// Dispatches capped SQL to the read-only channel.
pub struct ExecutionGate<'a> {
    channel: Option<&'a dyn ExecutionChannel>,
}

impl<'a> ExecutionGate<'a> {
    /// Creates a gate over the given channel, if any.
    pub fn new(channel: Option<&'a dyn ExecutionChannel>) -> Self {
        Self { channel }
    }

    /// Executes validated, tenant-scoped SQL.
    ///
    /// Returns the rows together with the statement actually sent. There is
    /// no fallback: without a channel nothing is executed.
    pub async fn execute(&self, sql: &str) -> Result<(ExecutionResult, String)> {
        let Some(channel) = self.channel else {
            warn!("No read-only execution channel configured; refusing to execute");
            return Err(SegmentError::setup_required(
                "no read-only execution channel is configured",
            ));
        };

        let capped = apply_row_cap(sql)?;

        let start = Instant::now();
        let rows = channel.run_select(&capped).await?;
        let received = rows.len();

        let result = ExecutionResult::from_rows(rows)
            .with_execution_time(start.elapsed())
            .truncate_to(ROW_CAP);

        if result.was_truncated {
            warn!(
                "Channel returned {} rows, truncating to {} rows",
                received, ROW_CAP
            );
        }

        info!(sql = %capped, rows = result.count, "Executed segment query");
        Ok((result, capped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FailingChannel, MockChannel, Record, UnavailableChannel};
    use crate::error::StatusClass;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_cap_appended_without_limit() {
        assert_eq!(
            apply_row_cap("SELECT p.patient_id FROM patients p WHERE p.tenant_id = 't1' AND (p.birth_date < '2000-01-01')")
                .unwrap(),
            "SELECT p.patient_id FROM patients p WHERE p.tenant_id = 't1' AND (p.birth_date < '2000-01-01') LIMIT 1000"
        );
    }

    #[test]
    fn test_cap_strips_trailing_semicolons() {
        assert_eq!(
            apply_row_cap("SELECT 1;  ").unwrap(),
            "SELECT 1 LIMIT 1000"
        );
    }

    #[test]
    fn test_existing_limit_is_wrapped() {
        assert_eq!(
            apply_row_cap("SELECT * FROM patients LIMIT 5000").unwrap(),
            "SELECT * FROM (SELECT * FROM patients LIMIT 5000) AS row_capped LIMIT 1000"
        );
        assert_eq!(
            apply_row_cap("SELECT * FROM patients FETCH FIRST 10 ROWS ONLY").unwrap(),
            "SELECT * FROM (SELECT * FROM patients FETCH FIRST 10 ROWS ONLY) AS row_capped LIMIT 1000"
        );
    }

    #[test]
    fn test_limit_inside_literal_is_ignored() {
        assert_eq!(
            apply_row_cap("SELECT * FROM intake i WHERE i.chief_complaint = 'limit'").unwrap(),
            "SELECT * FROM intake i WHERE i.chief_complaint = 'limit' LIMIT 1000"
        );
    }

    #[tokio::test]
    async fn test_no_channel_is_setup_required() {
        let gate = ExecutionGate::new(None);
        let err = gate.execute("SELECT 1").await.unwrap_err();
        assert_eq!(err.status(), StatusClass::SetupRequired);
    }

    #[tokio::test]
    async fn test_execute_sends_capped_sql() {
        let channel = MockChannel::with_sample_patients();
        let gate = ExecutionGate::new(Some(&channel));

        let (result, sql) = gate
            .execute("SELECT * FROM patients p WHERE p.tenant_id = 't1'")
            .await
            .unwrap();

        assert_eq!(sql, "SELECT * FROM patients p WHERE p.tenant_id = 't1' LIMIT 1000");
        assert_eq!(channel.last_statement(), Some(sql));
        assert_eq!(result.count, 3);
        assert!(!result.was_truncated);
    }

    #[tokio::test]
    async fn test_rows_truncated_on_receipt() {
        let rows: Vec<Record> = (0..1500)
            .filter_map(|i| json!({ "patient_id": i }).as_object().cloned())
            .collect();
        let channel = MockChannel::with_rows(rows);
        let gate = ExecutionGate::new(Some(&channel));

        let (result, _) = gate.execute("SELECT * FROM patients").await.unwrap();
        assert_eq!(result.count, ROW_CAP);
        assert!(result.was_truncated);
    }

    #[tokio::test]
    async fn test_channel_errors_propagate() {
        let failing = FailingChannel::default();
        let err = ExecutionGate::new(Some(&failing))
            .execute("SELECT 1")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusClass::ExecutionFailed);

        let err = ExecutionGate::new(Some(&UnavailableChannel))
            .execute("SELECT 1")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusClass::SetupRequired);
    }
}
