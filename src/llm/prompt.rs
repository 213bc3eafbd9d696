//! Prompt construction for LLM requests.
//!
//! Builds the fixed system prompt describing the allow-listed tables and the
//! query policy. The prompt is guidance only; nothing it says is enforced
//! here.

use crate::llm::types::Message;

/// Columns the generator may use, per allow-listed table.
const TABLE_CATALOG: &[(&str, &[&str])] = &[
    (
        "patients",
        &["patient_id", "name", "birth_date", "sex", "email", "phone", "created_at"],
    ),
    (
        "orders",
        &["order_id", "patient_id", "product", "quantity", "status", "ordered_at"],
    ),
    (
        "intake",
        &["intake_id", "patient_id", "chief_complaint", "submitted_at"],
    ),
    (
        "reservations",
        &["reservation_id", "patient_id", "starts_at", "status"],
    ),
    (
        "reorders",
        &["reorder_id", "order_id", "patient_id", "due_date", "status"],
    ),
];

/// System prompt template for the segment generator.
const SYSTEM_PROMPT_TEMPLATE: &str = r#"You translate descriptions of patient segments into a single PostgreSQL query.

TABLES:
{tables}

RULES:
- Write exactly one SELECT statement. No INSERT, UPDATE, DELETE, DDL or transaction control.
- Do not use comments, subqueries, CTEs (WITH) or UNION/INTERSECT/EXCEPT.
- Only reference the tables listed above. Join them with JOIN ... ON.
- Always select p.patient_id and p.name from patients aliased as p.
- Never filter on tenant_id. Tenant scoping is applied after generation.
- Do not add a LIMIT unless the description asks for one.

OUTPUT FORMAT:
Return the SQL query wrapped in a ```sql code block and nothing else."#;

/// Formats the table catalog for the prompt.
fn format_tables() -> String {
    TABLE_CATALOG
        .iter()
        .map(|(table, columns)| format!("- {} ({})", table, columns.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the system prompt with the table catalog injected.
pub fn build_system_prompt() -> String {
    SYSTEM_PROMPT_TEMPLATE.replace("{tables}", &format_tables())
}

/// Builds the complete message list for one generation request.
pub fn build_messages(query: &str) -> Vec<Message> {
    vec![
        Message::system(build_system_prompt()),
        Message::user(query.trim()),
    ]
}
