//! Segment query orchestration.
//!
//! Wires the generator, the validator, the tenant rewriter and the execution
//! gate into three modes:
//!
//! - preview: generate and validate, return SQL, execute nothing
//! - generate-and-run: generate, validate, scope to the tenant, execute
//! - run-supplied: validate caller SQL from scratch, scope, execute
//!
//! Nothing is cached between calls. Supplied SQL re-enters at the validator
//! even if this service produced it moments earlier.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::db::{ExecutionChannel, ExecutionResult};
use crate::error::{Result, SegmentError};
use crate::llm::{build_messages, extract_sql, LlmClient};
use crate::safety::{ensure_valid, scope_to_tenant};

use super::{ExecutionGate, QueryRequest, QueryResponse, TenantId};

/// Stage of a single request, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Generating,
    Validating,
    Rejected,
    Rewriting,
    Executing,
    Succeeded,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Validating => "validating",
            Self::Rejected => "rejected",
            Self::Rewriting => "rewriting",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Returns true for stages that end a request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(stage: PipelineStage) {
    debug!(stage = %stage, "Pipeline stage");
}

/// Logs a failure where it happened and marks the terminal stage.
fn fail(err: SegmentError) -> SegmentError {
    match &err {
        SegmentError::Validation { reason, sql } => {
            enter(PipelineStage::Rejected);
            warn!(reason = %reason, sql = %sql, "Rejected query");
        }
        SegmentError::Input(msg) => {
            enter(PipelineStage::Rejected);
            info!(reason = %msg, "Rejected request");
        }
        other => {
            enter(PipelineStage::Failed);
            error!(category = other.category(), detail = %other, "Query pipeline failed");
        }
    }
    err
}

/// The segment query service.
///
/// Holds the generator and the optional read-only channel. Both are shared
/// trait objects awaited once per request; the service itself has no
/// mutable state and can be shared across tasks.
pub struct SegmentService {
    generator: Arc<dyn LlmClient>,
    channel: Option<Arc<dyn ExecutionChannel>>,
}

impl SegmentService {
    /// Creates a service. Without a channel, every run fails with setup required.
    pub fn new(generator: Arc<dyn LlmClient>, channel: Option<Arc<dyn ExecutionChannel>>) -> Self {
        Self { generator, channel }
    }

    /// Returns true if a read-only channel is configured.
    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    /// Preview mode: returns validated SQL without executing anything.
    ///
    /// The SQL is returned before tenant scoping so it can be resubmitted
    /// through `run_supplied`.
    pub async fn preview(&self, query: &str) -> Result<String> {
        enter(PipelineStage::Idle);
        let sql = self.generate(query).await?;
        let sql = Self::validate(&sql)?;
        enter(PipelineStage::Succeeded);
        Ok(sql)
    }

    /// Generate-and-run mode.
    pub async fn generate_and_run(
        &self,
        query: &str,
        tenant: Option<&TenantId>,
    ) -> Result<(ExecutionResult, String)> {
        enter(PipelineStage::Idle);
        let sql = self.generate(query).await?;
        self.run_untrusted(&sql, tenant).await
    }

    /// Run-supplied mode. The SQL is treated as fully untrusted.
    pub async fn run_supplied(
        &self,
        sql: &str,
        tenant: Option<&TenantId>,
    ) -> Result<(ExecutionResult, String)> {
        enter(PipelineStage::Idle);
        self.run_untrusted(sql, tenant).await
    }

    /// Handles one request end to end and shapes the response.
    pub async fn handle(&self, request: &QueryRequest, tenant: Option<&TenantId>) -> QueryResponse {
        if let Err(e) = request.validate() {
            return QueryResponse::failed(&fail(e));
        }

        let outcome = match (&request.sql, request.execute) {
            (Some(sql), _) => self
                .run_supplied(sql, tenant)
                .await
                .map(|(result, sql)| QueryResponse::executed(&result, sql)),
            (None, true) => self
                .generate_and_run(&request.query, tenant)
                .await
                .map(|(result, sql)| QueryResponse::executed(&result, sql)),
            (None, false) => self.preview(&request.query).await.map(QueryResponse::preview),
        };

        outcome.unwrap_or_else(|e| QueryResponse::failed(&e))
    }

    async fn generate(&self, query: &str) -> Result<String> {
        enter(PipelineStage::Generating);
        let start = Instant::now();

        let response = self
            .generator
            .complete(&build_messages(query))
            .await
            .map_err(fail)?;

        debug!(
            llm_duration_ms = start.elapsed().as_millis() as u64,
            response_len = response.len(),
            "Received generator response"
        );

        extract_sql(&response)
            .ok_or_else(|| fail(SegmentError::generation("generator returned an empty response")))
    }

    fn validate(sql: &str) -> Result<String> {
        enter(PipelineStage::Validating);
        ensure_valid(sql).map_err(fail)?;
        Ok(sql.trim().to_string())
    }

    async fn run_untrusted(
        &self,
        sql: &str,
        tenant: Option<&TenantId>,
    ) -> Result<(ExecutionResult, String)> {
        let sql = Self::validate(sql)?;

        enter(PipelineStage::Rewriting);
        let scoped = scope_to_tenant(&sql, tenant.map(TenantId::as_str)).map_err(fail)?;

        enter(PipelineStage::Executing);
        let gate = ExecutionGate::new(self.channel.as_deref());
        let executed = gate.execute(&scoped).await.map_err(fail)?;

        enter(PipelineStage::Succeeded);
        Ok(executed)
    }
}
