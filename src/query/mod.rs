//! Segment query pipeline for segment-guard.
//!
//! Request and response shapes, the execution gate and the orchestrator
//! that wires generation, validation, tenant scoping and execution.

pub mod executor;
pub mod orchestrator;

pub use executor::{apply_row_cap, ExecutionGate, ROW_CAP};
pub use orchestrator::{PipelineStage, SegmentService};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::{ExecutionResult, Record};
use crate::error::{Result, SegmentError, StatusClass};

/// Maximum length of the natural-language description, in characters.
pub const MAX_QUERY_CHARS: usize = 500;

/// Maximum length of caller-supplied SQL, in characters.
pub const MAX_SUPPLIED_SQL_CHARS: usize = 10_000;

/// One inbound request.
///
/// The tenant is deliberately not part of the body; it arrives separately
/// from whatever authenticated the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Natural-language description of the segment.
    pub query: String,

    /// Run the query instead of only previewing it.
    #[serde(default)]
    pub execute: bool,

    /// SQL from an earlier preview to run instead of generating new SQL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl QueryRequest {
    /// Creates a preview request.
    pub fn preview(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Creates a generate-and-run request.
    pub fn execute(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            execute: true,
            sql: None,
        }
    }

    /// Creates a run-supplied request.
    pub fn run_supplied(query: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            execute: true,
            sql: Some(sql.into()),
        }
    }

    /// Checks the request shape before anything else runs.
    pub fn validate(&self) -> Result<()> {
        let chars = self.query.trim().chars().count();
        if chars == 0 {
            return Err(SegmentError::input("query must not be empty"));
        }
        if chars > MAX_QUERY_CHARS {
            return Err(SegmentError::input(format!(
                "query must be at most {MAX_QUERY_CHARS} characters"
            )));
        }

        if let Some(sql) = &self.sql {
            if !self.execute {
                return Err(SegmentError::input("sql may only be supplied with execute"));
            }
            let sql_chars = sql.trim().chars().count();
            if sql_chars == 0 {
                return Err(SegmentError::input("sql must not be empty"));
            }
            if sql_chars > MAX_SUPPLIED_SQL_CHARS {
                return Err(SegmentError::input(format!(
                    "sql must be at most {MAX_SUPPLIED_SQL_CHARS} characters"
                )));
            }
        }

        Ok(())
    }
}

/// Opaque tenant identifier resolved by the caller's authentication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A patient row as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientSummary {
    pub patient_id: serde_json::Value,
    pub name: serde_json::Value,
}

impl PatientSummary {
    /// Projects a result record onto `patient_id` and `name`; missing fields are null.
    pub fn from_record(record: &Record) -> Self {
        let field = |key: &str| record.get(key).cloned().unwrap_or(serde_json::Value::Null);
        Self {
            patient_id: field("patient_id"),
            name: field("name"),
        }
    }
}

/// Response to one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    /// Validated SQL returned for inspection, nothing executed.
    Preview { ok: bool, sql: String, preview: bool },

    /// Rows from an execution, with the statement actually sent.
    Executed {
        ok: bool,
        patients: Vec<PatientSummary>,
        count: usize,
        sql: String,
    },

    /// Any failure. `status` is for the transport, not the body.
    Failed {
        ok: bool,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sql: Option<String>,
        #[serde(skip)]
        status: StatusClass,
    },
}

impl QueryResponse {
    pub fn preview(sql: impl Into<String>) -> Self {
        Self::Preview {
            ok: true,
            sql: sql.into(),
            preview: true,
        }
    }

    pub fn executed(result: &ExecutionResult, sql: impl Into<String>) -> Self {
        Self::Executed {
            ok: true,
            patients: result.rows.iter().map(PatientSummary::from_record).collect(),
            count: result.count,
            sql: sql.into(),
        }
    }

    /// Builds a failure carrying only the caller-safe message.
    pub fn failed(error: &SegmentError) -> Self {
        Self::Failed {
            ok: false,
            error: error.public_message(),
            sql: error.offending_sql().map(String::from),
            status: error.status(),
        }
    }

    /// Status class of this response.
    pub fn status(&self) -> StatusClass {
        match self {
            Self::Preview { .. } | Self::Executed { .. } => StatusClass::Ok,
            Self::Failed { status, .. } => *status,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status().is_success()
    }

    /// The SQL carried by this response, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Preview { sql, .. } | Self::Executed { sql, .. } => Some(sql),
            Self::Failed { sql, .. } => sql.as_deref(),
        }
    }
}
