//! Query safety module.
//!
//! Gates SQL produced by the generator before it reaches the database:
//! the validator proves a statement is a single read-only SELECT over
//! allow-listed tables, and the rewriter scopes every table reference to
//! the caller's tenant. Both are pure functions over the SQL text.

mod rewriter;
mod tables;
pub mod tokenizer;
mod validator;

pub use rewriter::{quote_literal, scope_to_tenant, tenant_conjunction};
pub use tables::collect_table_references;
pub use validator::{ensure_valid, validate_sql};

use std::fmt;

/// Tables the sandbox permits referencing. Lower-case, unqualified.
pub const ALLOWED_TABLES: &[&str] = &["patients", "orders", "intake", "reservations", "reorders"];

/// Column carrying the tenant identifier on every allow-listed table.
pub const TENANT_COLUMN: &str = "tenant_id";

/// Returns true if the normalized table name is allow-listed.
pub fn is_allowed_table(name: &str) -> bool {
    ALLOWED_TABLES.contains(&name)
}

/// Outcome of validating a SQL string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    /// Whether the SQL passed every rule.
    pub valid: bool,
    /// The violated rule. Only set on rejection.
    pub reason: Option<String>,
}

impl ValidationVerdict {
    /// Creates a passing verdict.
    pub fn pass() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    /// Creates a rejection naming the violated rule.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl fmt::Display for ValidationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            None => write!(f, "valid"),
            Some(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

/// A table named after FROM or JOIN, with the qualifier used to reference it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    /// Normalized table name (unquoted parts lower-cased, schema kept).
    pub table_name: String,
    /// Qualifier as written in the query; defaults to the table name.
    pub alias: String,
}

impl TableReference {
    pub fn new(table_name: impl Into<String>, alias: Option<String>) -> Self {
        let table_name = table_name.into();
        let alias = alias.unwrap_or_else(|| table_name.clone());
        Self { table_name, alias }
    }
}
