//! Error types for segment-guard.
//!
//! Defines the main error enum used throughout the pipeline and maps each
//! failure to the status class reported to callers.

use thiserror::Error;

/// Main error type for segment-guard operations.
#[derive(Error, Debug)]
pub enum SegmentError {
    /// Malformed request (query length out of bounds, empty supplied SQL, etc.)
    #[error("Input error: {0}")]
    Input(String),

    /// Policy violation found by the validator or the rewriter.
    #[error("Validation error: {reason}")]
    Validation {
        /// The violated rule.
        reason: String,
        /// The offending SQL, kept for auditability.
        sql: String,
    },

    /// Generation service failed or returned unusable text.
    #[error("Generation error: {0}")]
    Generation(String),

    /// The execution channel rejected or failed the statement.
    #[error("Execution error: {0}")]
    Execution(String),

    /// The read-only execution channel is absent or misconfigured.
    #[error("Setup required: {0}")]
    SetupRequired(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Status class of a response, one per failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Ok,
    InputError,
    ValidationRejected,
    GenerationFailed,
    ExecutionFailed,
    SetupRequired,
}

impl StatusClass {
    /// HTTP status code a transport layer should use for this class.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::InputError => 400,
            Self::ValidationRejected => 422,
            Self::GenerationFailed => 502,
            Self::ExecutionFailed => 500,
            Self::SetupRequired => 503,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl SegmentError {
    /// Creates an input error with the given message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Creates a validation error for the given rule and offending SQL.
    pub fn validation(reason: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
            sql: sql.into(),
        }
    }

    /// Creates a generation error with the given message.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates a setup-required error with the given message.
    pub fn setup_required(msg: impl Into<String>) -> Self {
        Self::SetupRequired(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Input(_) => "Input Error",
            Self::Validation { .. } => "Validation Error",
            Self::Generation(_) => "Generation Error",
            Self::Execution(_) => "Execution Error",
            Self::SetupRequired(_) => "Setup Required",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the status class reported to the caller.
    pub fn status(&self) -> StatusClass {
        match self {
            Self::Input(_) => StatusClass::InputError,
            Self::Validation { .. } => StatusClass::ValidationRejected,
            Self::Generation(_) => StatusClass::GenerationFailed,
            Self::SetupRequired(_) => StatusClass::SetupRequired,
            Self::Execution(_) | Self::Config(_) | Self::Internal(_) => {
                StatusClass::ExecutionFailed
            }
        }
    }

    /// Returns the message safe to show the caller.
    ///
    /// Input and validation errors are the caller's to fix and are returned
    /// verbatim. Everything else stays in the server log.
    pub fn public_message(&self) -> String {
        match self {
            Self::Input(msg) => msg.clone(),
            Self::Validation { reason, .. } => reason.clone(),
            Self::Generation(_) => "Failed to generate a query. Please try again.".to_string(),
            Self::SetupRequired(_) => {
                "Query execution is not set up. Install the read-only execution function."
                    .to_string()
            }
            Self::Execution(_) | Self::Config(_) | Self::Internal(_) => {
                "Query execution failed.".to_string()
            }
        }
    }

    /// Returns the offending SQL for validation failures.
    pub fn offending_sql(&self) -> Option<&str> {
        match self {
            Self::Validation { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

/// Result type alias using SegmentError.
pub type Result<T> = std::result::Result<T, SegmentError>;
