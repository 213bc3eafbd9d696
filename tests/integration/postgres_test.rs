//! Read-only channel integration tests.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL to run them; they are skipped otherwise.
//!
//! Fixtures are temporary tables on a single-connection pool, so nothing is
//! left behind except the channel function itself.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use segment_guard::config::SandboxConfig;
use segment_guard::db::{ExecutionChannel, PostgresChannel};
use segment_guard::error::StatusClass;
use segment_guard::llm::MockLlmClient;
use segment_guard::query::{QueryRequest, SegmentService, TenantId};
use sqlx::postgres::PgPoolOptions;

const FIXTURES: &str = r#"
CREATE TEMP TABLE patients (
    patient_id text PRIMARY KEY,
    tenant_id text NOT NULL,
    name text NOT NULL,
    birth_date date
);
INSERT INTO patients VALUES
    ('p-001', 't1', 'Ada Lovelace', '1990-12-10'),
    ('p-002', 't1', 'Grace Hopper', '2004-12-09'),
    ('p-003', 't2', 'Alan Turing', '1992-06-23');
"#;

/// Helper to create a channel over a pool with the fixtures installed.
async fn get_test_channel() -> Option<Arc<PostgresChannel>> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .ok()?;

    sqlx::raw_sql(include_str!("../../sql/readonly_channel.sql"))
        .execute(&pool)
        .await
        .ok()?;
    sqlx::raw_sql(FIXTURES).execute(&pool).await.ok()?;

    Some(Arc::new(PostgresChannel::from_pool(pool, SandboxConfig::default())))
}

/// Scenario: Birth date segment for one tenant
/// Given three patients across two tenants
/// When tenant t1 runs "patients born before 2000"
/// Then only Ada Lovelace is returned
#[tokio::test]
async fn test_scenario_against_postgres() {
    let Some(channel) = get_test_channel().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let service = SegmentService::new(Arc::new(MockLlmClient::new()), Some(channel.clone()));

    let (result, sql) = service
        .generate_and_run("patients born before 2000", Some(&TenantId::new("t1")))
        .await
        .unwrap();

    assert!(sql.ends_with(" LIMIT 1000"));
    assert_eq!(result.count, 1);
    assert_eq!(result.rows[0]["name"], "Ada Lovelace");

    channel.close().await.unwrap();
}

/// Scenario: Write smuggled past the caller is refused by the channel
#[tokio::test]
async fn test_channel_refuses_writes() {
    let Some(channel) = get_test_channel().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = channel
        .run_select("DELETE FROM patients")
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusClass::ExecutionFailed);

    let rows = channel
        .run_select("SELECT count(*) AS n FROM patients")
        .await
        .unwrap();
    assert_eq!(rows[0]["n"], 3);

    channel.close().await.unwrap();
}

/// Scenario: Unknown column surfaces as a generic execution failure
#[tokio::test]
async fn test_execution_error_is_generic() {
    let Some(channel) = get_test_channel().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let service = SegmentService::new(Arc::new(MockLlmClient::new()), Some(channel.clone()));

    let response = service
        .handle(
            &QueryRequest::run_supplied("x", "SELECT p.no_such_column FROM patients p"),
            Some(&TenantId::new("t1")),
        )
        .await;

    assert_eq!(response.status(), StatusClass::ExecutionFailed);
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["error"], "Query execution failed.");

    channel.close().await.unwrap();
}
