//! End-to-end pipeline tests over the in-memory channel.
//!
//! These run without a database or API key.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use segment_guard::db::{ExecutionChannel, FailingChannel, MockChannel, UnavailableChannel};
use segment_guard::error::StatusClass;
use segment_guard::llm::{FailingLlmClient, LlmClient, MockLlmClient};
use segment_guard::query::{QueryRequest, QueryResponse, SegmentService, TenantId};
use serde_json::json;

fn service(channel: Option<Arc<dyn ExecutionChannel>>) -> SegmentService {
    SegmentService::new(Arc::new(MockLlmClient::new()), channel)
}

fn service_with_generator(generator: impl LlmClient + 'static, channel: Arc<MockChannel>) -> SegmentService {
    SegmentService::new(Arc::new(generator), Some(channel))
}

fn t1() -> TenantId {
    TenantId::new("t1")
}

/// Scenario: Preview then run the previewed SQL
/// Given a preview for "patients born before 2000"
/// When the returned SQL is resubmitted with execute
/// Then the executed SQL is tenant-scoped and capped
/// And only tenant t1 rows come back
#[tokio::test]
async fn test_preview_then_run_supplied() {
    let channel = Arc::new(MockChannel::with_sample_patients());
    let service = service(Some(channel.clone()));

    let preview = service
        .handle(&QueryRequest::preview("Patients born before 2000"), Some(&t1()))
        .await;
    let previewed = preview.sql().unwrap().to_string();
    assert!(preview.is_ok());
    assert!(!previewed.contains("tenant_id"));
    assert!(channel.statements().is_empty());

    let response = service
        .handle(
            &QueryRequest::run_supplied("Patients born before 2000", previewed),
            Some(&t1()),
        )
        .await;

    assert_eq!(
        response.sql(),
        Some("SELECT p.patient_id, p.name FROM patients p WHERE p.tenant_id = 't1' AND (p.birth_date < '2000-01-01') LIMIT 1000")
    );
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["ok"], json!(true));
    assert_eq!(value["count"], json!(3));
    assert_eq!(value["patients"][0], json!({ "patient_id": "p-001", "name": "Ada Lovelace" }));
}

/// Scenario: Tenant isolation on a join
/// Given generated SQL joining patients and reorders
/// When it runs for tenant t2
/// Then both aliases carry a tenant predicate
#[tokio::test]
async fn test_join_is_scoped_per_alias() {
    let channel = Arc::new(MockChannel::with_sample_patients());
    let service = service(Some(channel.clone()));
    let tenant = TenantId::new("t2");

    let (result, sql) = service
        .generate_and_run("patients with a reorder due", Some(&tenant))
        .await
        .unwrap();

    assert!(sql.contains("p.tenant_id = 't2'"));
    assert!(sql.contains("r.tenant_id = 't2'"));
    assert!(sql.ends_with(" LIMIT 1000"));
    assert_eq!(result.count, 2);
}

/// Scenario: Tenant literal with a quote
/// Given a tenant id containing a single quote
/// When a query runs for it
/// Then the quote is doubled in the predicate
#[tokio::test]
async fn test_tenant_with_quote_is_escaped() {
    let channel = Arc::new(MockChannel::with_sample_patients());
    let service = service(Some(channel.clone()));
    let tenant = TenantId::new("o'brien");

    let (_, sql) = service
        .run_supplied("SELECT p.name FROM patients p", Some(&tenant))
        .await
        .unwrap();

    assert_eq!(
        sql,
        "SELECT p.name FROM patients p WHERE p.tenant_id = 'o''brien' LIMIT 1000"
    );
}

/// Scenario: Hostile generations never reach the channel
#[tokio::test]
async fn test_hostile_generations_are_rejected() {
    let channel = Arc::new(MockChannel::with_sample_patients());
    let service = service(Some(channel.clone()));

    let cases = [
        ("drop the table", "forbidden keyword: DROP"),
        ("something slow", "forbidden function: pg_sleep"),
        ("list admin accounts", "table not allowed: admin_users"),
    ];

    for (query, reason) in cases {
        let response = service.handle(&QueryRequest::execute(query), Some(&t1())).await;
        assert_eq!(response.status(), StatusClass::ValidationRejected, "{query}");
        assert_eq!(response.status().http_status(), 422);

        let value = serde_json::to_value(&response).unwrap();
        let error = value["error"].as_str().unwrap();
        assert!(error.contains(reason), "{query}: {error}");
        assert!(value["sql"].is_string(), "{query}");
    }

    assert!(channel.statements().is_empty());
}

/// Scenario: Supplied SQL is revalidated
/// Given supplied SQL with a second statement
/// When it is run
/// Then it is rejected and nothing executes
#[tokio::test]
async fn test_supplied_multiple_statements_rejected() {
    let channel = Arc::new(MockChannel::with_sample_patients());
    let service = service(Some(channel.clone()));

    let response = service
        .handle(
            &QueryRequest::run_supplied("x", "SELECT * FROM patients; DELETE FROM patients"),
            Some(&t1()),
        )
        .await;

    assert_eq!(response.status(), StatusClass::ValidationRejected);
    assert!(channel.statements().is_empty());
}

/// Scenario: Supplied SQL with a comment or a subquery
#[tokio::test]
async fn test_supplied_comment_and_subquery_rejected() {
    let channel = Arc::new(MockChannel::with_sample_patients());
    let service = service(Some(channel.clone()));

    for sql in [
        "SELECT * FROM patients -- WHERE tenant_id = 't2'",
        "SELECT * FROM patients p WHERE p.patient_id IN (SELECT o.patient_id FROM orders o)",
        "SELECT p.name FROM patients p UNION SELECT a.name FROM admin_users a",
    ] {
        let response = service
            .handle(&QueryRequest::run_supplied("x", sql), Some(&t1()))
            .await;
        assert_eq!(response.status(), StatusClass::ValidationRejected, "{sql}");
    }

    assert!(channel.statements().is_empty());
}

/// Scenario: Query length boundary
#[tokio::test]
async fn test_query_length_boundary() {
    let service = service(None);

    let at_limit = format!("all patients {}", "a".repeat(487));
    assert_eq!(at_limit.chars().count(), 500);
    let response = service.handle(&QueryRequest::preview(at_limit), None).await;
    assert!(response.is_ok());

    let over_limit = "a".repeat(501);
    let response = service.handle(&QueryRequest::preview(over_limit), None).await;
    assert_eq!(response.status(), StatusClass::InputError);
    assert_eq!(response.status().http_status(), 400);
}

/// Scenario: No channel configured
/// Given a service without a read-only channel
/// When a query is executed
/// Then setup required is reported
/// And preview still works
#[tokio::test]
async fn test_missing_channel_fails_closed() {
    let service = service(None);

    let response = service
        .handle(&QueryRequest::execute("all patients"), Some(&t1()))
        .await;
    assert_eq!(response.status(), StatusClass::SetupRequired);
    assert_eq!(response.status().http_status(), 503);
    assert_eq!(response.sql(), None);

    let response = service
        .handle(&QueryRequest::preview("all patients"), Some(&t1()))
        .await;
    assert!(response.is_ok());
}

/// Scenario: Channel present but not set up
#[tokio::test]
async fn test_unavailable_channel_is_setup_required() {
    let service = service(Some(Arc::new(UnavailableChannel)));
    let response = service
        .handle(&QueryRequest::execute("all patients"), Some(&t1()))
        .await;
    assert_eq!(response.status(), StatusClass::SetupRequired);
}

/// Scenario: Execution failure hides driver detail
#[tokio::test]
async fn test_execution_failure_is_generic() {
    let service = service(Some(Arc::new(FailingChannel::new(
        "ERROR: relation \"patients\" does not exist at character 15",
    ))));

    let response = service
        .handle(&QueryRequest::execute("all patients"), Some(&t1()))
        .await;

    assert_eq!(response.status(), StatusClass::ExecutionFailed);
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value, json!({ "ok": false, "error": "Query execution failed." }));
}

/// Scenario: Generator unavailable
#[tokio::test]
async fn test_generation_failure_is_502() {
    let channel = Arc::new(MockChannel::with_sample_patients());
    let service = service_with_generator(FailingLlmClient, channel.clone());

    let response = service
        .handle(&QueryRequest::execute("all patients"), Some(&t1()))
        .await;

    assert_eq!(response.status(), StatusClass::GenerationFailed);
    assert_eq!(response.status().http_status(), 502);
    assert!(channel.statements().is_empty());
}

/// Scenario: Generated SQL carries its own larger LIMIT
#[tokio::test]
async fn test_generated_limit_is_wrapped_by_cap() {
    let channel = Arc::new(MockChannel::with_sample_patients());
    let generator = MockLlmClient::new()
        .with_response("first five thousand", "SELECT p.patient_id FROM patients p LIMIT 5000");
    let service = service_with_generator(generator, channel.clone());

    let response = service
        .handle(&QueryRequest::execute("first five thousand"), Some(&t1()))
        .await;

    assert_eq!(
        response.sql(),
        Some("SELECT * FROM (SELECT p.patient_id FROM patients p WHERE p.tenant_id = 't1' LIMIT 5000) AS row_capped LIMIT 1000")
    );
}

/// Scenario: Response for a preview has the documented shape
#[tokio::test]
async fn test_preview_response_shape() {
    let response = service(None)
        .handle(&QueryRequest::preview("all patients"), None)
        .await;
    assert!(matches!(response, QueryResponse::Preview { .. }));

    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["preview"], json!(true));
    assert_eq!(value["ok"], json!(true));
}
