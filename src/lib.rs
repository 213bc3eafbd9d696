//! segment-guard - a safety layer for LLM-generated SQL over a multi-tenant clinic database.
//!
//! Generated or supplied SQL is validated, scoped to the caller's tenant,
//! capped and run through a read-only channel. This library exposes the
//! core modules for the binary and the integration tests.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod query;
pub mod safety;
