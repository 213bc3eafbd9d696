//! Tenant isolation rewriting.
//!
//! Injects `alias.tenant_id = '<tenant>'` for every allow-listed table
//! reference. The generator is told never to filter by tenant itself, so
//! this is the only place isolation is enforced.

use tracing::{debug, info};

use crate::error::{Result, SegmentError};

use super::tables::{collect_table_references, has_nested_query, NESTED_QUERY_REASON};
use super::tokenizer::{tokenize, Token, TokenKind};
use super::{is_allowed_table, TableReference, TENANT_COLUMN};

/// Top-level keywords that end a WHERE predicate.
const CLAUSE_BOUNDARIES: &[&str] = &[
    "GROUP", "HAVING", "WINDOW", "ORDER", "LIMIT", "OFFSET", "FETCH", "FOR",
];

/// Quotes a value as a SQL string literal, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Builds `a.tenant_id = 't' AND b.tenant_id = 't'` for the given tables.
pub fn tenant_conjunction(tables: &[&TableReference], tenant_id: &str) -> String {
    let literal = quote_literal(tenant_id);
    tables
        .iter()
        .map(|t| format!("{}.{} = {}", t.alias, TENANT_COLUMN, literal))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Scopes a validated query to a single tenant.
///
/// Table references are re-derived from the text here rather than taken
/// from the validator. With no tenant the query is returned unchanged: that
/// is the single-tenant deployment mode, and it is logged every time.
///
/// An existing WHERE predicate is wrapped in parentheses so that an `OR`
/// inside it cannot escape the tenant filter; its text is otherwise kept
/// byte for byte.
pub fn scope_to_tenant(sql: &str, tenant_id: Option<&str>) -> Result<String> {
    let sql = sql.trim();

    let Some(tenant_id) = tenant_id else {
        info!("No tenant id supplied; tenant isolation is disabled for this query");
        return Ok(sql.to_string());
    };

    let tokens = tokenize(sql).map_err(|e| {
        SegmentError::validation(format!("unsupported SQL construct: {}", e), sql)
    })?;
    if has_nested_query(sql, &tokens) {
        return Err(SegmentError::validation(NESTED_QUERY_REASON, sql));
    }
    let refs =
        collect_table_references(sql, &tokens).map_err(|reason| SegmentError::validation(reason, sql))?;

    let mut scoped: Vec<&TableReference> = Vec::new();
    for table in refs.iter().filter(|t| is_allowed_table(&t.table_name)) {
        if !scoped.iter().any(|s| s.alias == table.alias) {
            scoped.push(table);
        }
    }

    if scoped.is_empty() {
        debug!("No allow-listed tables referenced; nothing to scope");
        return Ok(sql.to_string());
    }

    let conjunction = tenant_conjunction(&scoped, tenant_id);

    // End of the statement body, before an optional trailing semicolon.
    let body_end = match tokens.last() {
        Some(t) if t.kind == TokenKind::Semicolon => t.start,
        _ => sql.len(),
    };

    let from_start = tokens
        .iter()
        .find(|t| t.depth == 0 && is_clause_keyword(sql, t, "FROM"))
        .map_or(0, |t| t.start);
    let top_level = tokens.iter().filter(|t| t.depth == 0 && t.start >= from_start);

    let rewritten = match top_level.clone().find(|t| is_clause_keyword(sql, t, "WHERE")) {
        Some(where_token) => {
            let predicate_start = where_token.end;
            let predicate_end = top_level
                .filter(|t| t.start > where_token.start)
                .find(|t| is_clause_boundary(sql, t))
                .map_or(body_end, |t| t.start);

            let predicate = &sql[predicate_start..predicate_end];
            let trimmed = predicate.trim();
            if trimmed.is_empty() {
                return Err(SegmentError::validation("empty WHERE clause", sql));
            }
            let trailing = &predicate[predicate.trim_end().len()..];

            format!(
                "{} {} AND ({}){}{}",
                &sql[..predicate_start],
                conjunction,
                trimmed,
                trailing,
                &sql[predicate_end..]
            )
        }
        None => match top_level.clone().find(|t| is_clause_boundary(sql, t)) {
            Some(boundary) => format!(
                "{} WHERE {} {}",
                sql[..boundary.start].trim_end(),
                conjunction,
                &sql[boundary.start..]
            ),
            None => format!(
                "{} WHERE {}{}",
                sql[..body_end].trim_end(),
                conjunction,
                &sql[body_end..]
            ),
        },
    };

    debug!(tables = scoped.len(), "Scoped query to tenant");
    Ok(rewritten)
}

fn is_clause_boundary(sql: &str, token: &Token) -> bool {
    CLAUSE_BOUNDARIES
        .iter()
        .any(|kw| is_clause_keyword(sql, token, kw))
}

/// A keyword that follows a dot is a column name, as in `o.order`.
fn is_clause_keyword(sql: &str, token: &Token, keyword: &str) -> bool {
    token.is_keyword(sql, keyword) && !sql[..token.start].trim_end().ends_with('.')
}
