//! SQL policy validation.
//!
//! Each rule short-circuits, so a verdict names exactly one violated rule.
//! The checks run over raw text first (deny-list, semicolons) and only then
//! over tokens, so a string literal can never hide a forbidden token.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, SegmentError};

use super::tables::{collect_table_references, has_nested_query, NESTED_QUERY_REASON};
use super::tokenizer::{tokenize, TokenKind};
use super::{is_allowed_table, ValidationVerdict};

/// Statement verbs that mutate data, change schema or privileges, or
/// control sessions and transactions.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT",
    "UPDATE",
    "DELETE",
    "MERGE",
    "UPSERT",
    "INTO",
    "DROP",
    "CREATE",
    "ALTER",
    "TRUNCATE",
    "RENAME",
    "GRANT",
    "REVOKE",
    "COPY",
    "EXECUTE",
    "CALL",
    "DO",
    "SET",
    "RESET",
    "BEGIN",
    "COMMIT",
    "ROLLBACK",
    "SAVEPOINT",
    "PREPARE",
    "DEALLOCATE",
    "DISCARD",
    "LOCK",
    "LISTEN",
    "NOTIFY",
    "VACUUM",
    "ANALYZE",
    "REINDEX",
    "CLUSTER",
    "REFRESH",
];

/// Server-side functions that sleep, touch the filesystem, reach other
/// servers, run query strings or change server state.
const FORBIDDEN_FUNCTIONS: &[&str] = &[
    "pg_sleep",
    "pg_sleep_for",
    "pg_sleep_until",
    "pg_read_file",
    "pg_read_binary_file",
    "pg_ls_dir",
    "pg_stat_file",
    "pg_file_write",
    "pg_logdir_ls",
    "lo_import",
    "lo_export",
    "lo_get",
    "lo_put",
    "lo_unlink",
    "lo_from_bytea",
    "dblink",
    "dblink_exec",
    "dblink_connect",
    "query_to_xml",
    "table_to_xml",
    "cursor_to_xml",
    "schema_to_xml",
    "database_to_xml",
    "ts_stat",
    "set_config",
    "current_setting",
    "pg_terminate_backend",
    "pg_cancel_backend",
    "pg_reload_conf",
    "pg_rotate_logfile",
    "pg_promote",
    "pg_switch_wal",
    "pg_advisory_lock",
    "pg_advisory_xact_lock",
    "pg_notify",
    "nextval",
    "setval",
    "loread",
    "lowrite",
];

/// Function families matched by prefix when called, so a new suffix such as
/// `query_to_xml_and_xmlschema` is denied along with the base name.
const FORBIDDEN_FUNCTION_PREFIXES: &[&str] = &[
    "query_to_xml",
    "table_to_xml",
    "cursor_to_xml",
    "schema_to_xml",
    "database_to_xml",
    "pg_ls_",
    "pg_read_",
    "pg_sleep",
    "pg_advisory_",
    "lo_",
    "dblink",
];

/// Comment markers. Matched literally since they have no word boundaries.
const FORBIDDEN_MARKERS: &[&str] = &["--", "/*", "*/"];

/// Keywords that introduce a second query.
const SET_OPERATIONS: &[&str] = &["UNION", "INTERSECT", "EXCEPT"];

struct DenyPattern {
    reason: String,
    regex: Regex,
}

fn deny_patterns() -> &'static [DenyPattern] {
    static PATTERNS: OnceLock<Vec<DenyPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let keywords = FORBIDDEN_KEYWORDS
            .iter()
            .map(|kw| (format!("forbidden keyword: {}", kw), *kw));
        let functions = FORBIDDEN_FUNCTIONS
            .iter()
            .map(|func| (format!("forbidden function: {}", func), *func));
        keywords
            .chain(functions)
            .map(|(reason, word)| DenyPattern {
                reason,
                regex: Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word)))
                    .expect("deny-list patterns are valid regexes"),
            })
            .collect()
    })
}

fn function_family_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let families = FORBIDDEN_FUNCTION_PREFIXES
            .iter()
            .map(|prefix| regex::escape(prefix))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r#"(?i)\b((?:{})\w*)"?\s*\("#, families))
            .expect("function family pattern is a valid regex")
    })
}

/// The deny-listed keyword or function that appears first in `sql`.
fn first_forbidden(sql: &str) -> Option<String> {
    let listed = deny_patterns()
        .iter()
        .filter_map(|p| p.regex.find(sql).map(|m| (m.start(), p.reason.clone())));
    let family = function_family_pattern().captures(sql).and_then(|c| {
        c.get(1).map(|name| {
            (
                name.start(),
                format!("forbidden function: {}", name.as_str().to_ascii_lowercase()),
            )
        })
    });
    listed
        .chain(family)
        .min_by_key(|(start, _)| *start)
        .map(|(_, reason)| reason)
}

/// Validates SQL against the sandbox policy.
///
/// Rules, in order:
/// 1. must start with SELECT
/// 2. no comment marker, deny-listed keyword or function (first one in the
///    text is named)
/// 3. at most one statement (one trailing semicolon allowed)
/// 4. tokenizes cleanly, with no nested queries or set operations
/// 5. every FROM/JOIN table is allow-listed
pub fn validate_sql(sql: &str) -> ValidationVerdict {
    let trimmed = sql.trim();

    if !starts_with_select(trimmed) {
        let base = "only SELECT statements are allowed (SELECT-only)";
        return match first_forbidden(trimmed) {
            Some(found) => ValidationVerdict::reject(format!("{}: {}", base, found)),
            None => ValidationVerdict::reject(base),
        };
    }

    for marker in FORBIDDEN_MARKERS {
        if trimmed.contains(marker) {
            return ValidationVerdict::reject(format!("forbidden token: {}", marker));
        }
    }

    if let Some(reason) = first_forbidden(trimmed) {
        return ValidationVerdict::reject(reason);
    }

    let body = trimmed.strip_suffix(';').unwrap_or(trimmed);
    if body.contains(';') {
        return ValidationVerdict::reject("multiple statements not allowed");
    }

    let tokens = match tokenize(body) {
        Ok(tokens) => tokens,
        Err(e) => return ValidationVerdict::reject(format!("unsupported SQL construct: {}", e)),
    };

    if has_nested_query(body, &tokens) {
        return ValidationVerdict::reject(NESTED_QUERY_REASON);
    }

    if let Some(op) = tokens.iter().find(|t| {
        t.kind == TokenKind::Word
            && SET_OPERATIONS
                .iter()
                .any(|kw| t.text(body).eq_ignore_ascii_case(kw))
    }) {
        return ValidationVerdict::reject(format!(
            "set operations are not allowed: {}",
            op.text(body).to_uppercase()
        ));
    }

    let tables = match collect_table_references(body, &tokens) {
        Ok(tables) => tables,
        Err(reason) => return ValidationVerdict::reject(reason),
    };

    if let Some(table) = tables.iter().find(|t| !is_allowed_table(&t.table_name)) {
        return ValidationVerdict::reject(format!("table not allowed: {}", table.table_name));
    }

    ValidationVerdict::pass()
}

/// Validates SQL and converts a rejection into a `SegmentError::Validation`
/// carrying the offending text.
pub fn ensure_valid(sql: &str) -> Result<()> {
    let verdict = validate_sql(sql);
    match verdict.reason {
        None => Ok(()),
        Some(reason) => Err(SegmentError::validation(reason, sql)),
    }
}

/// Leading SELECT, case-insensitive, followed by a word boundary.
fn starts_with_select(sql: &str) -> bool {
    let Some(head) = sql.get(..6) else {
        return false;
    };
    head.eq_ignore_ascii_case("SELECT")
        && sql[6..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
}
