//! Integration tests for segment-guard.
//!
//! The pipeline tests run anywhere. The Postgres tests require a running
//! database and are skipped unless DATABASE_URL is set.

pub mod pipeline_test;
pub mod postgres_test;
