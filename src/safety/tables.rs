//! Table reference extraction.
//!
//! Walks top-level FROM and JOIN clauses and collects the tables they name.
//! Anything after FROM/JOIN that is not a plain (optionally qualified)
//! table name is an error, so derived tables and table functions never
//! slip past the allow-list.

use super::tokenizer::{identifier_name, Token, TokenKind};
use super::TableReference;

/// Words that end a table factor instead of aliasing it.
const NON_ALIAS_KEYWORDS: &[&str] = &[
    "ON",
    "USING",
    "WHERE",
    "GROUP",
    "HAVING",
    "WINDOW",
    "ORDER",
    "LIMIT",
    "OFFSET",
    "FETCH",
    "FOR",
    "JOIN",
    "INNER",
    "LEFT",
    "RIGHT",
    "FULL",
    "CROSS",
    "OUTER",
    "NATURAL",
    "UNION",
    "INTERSECT",
    "EXCEPT",
    "TABLESAMPLE",
    "LATERAL",
    "AS",
];

pub const NESTED_QUERY_REASON: &str = "nested queries are not allowed";

/// Whether the query contains a second query.
///
/// A second SELECT counts at any depth. `TABLE x` and `VALUES (...)` are
/// queries too and count inside parentheses, where table extraction never
/// looks.
pub fn has_nested_query(sql: &str, tokens: &[Token]) -> bool {
    let selects = tokens.iter().filter(|t| t.is_keyword(sql, "SELECT")).count();
    selects > 1
        || tokens
            .iter()
            .any(|t| t.depth > 0 && (t.is_keyword(sql, "TABLE") || t.is_keyword(sql, "VALUES")))
}

/// Collects every table named after a top-level FROM or JOIN.
///
/// Returns the rule violated when a FROM/JOIN target cannot be read as a
/// table name.
pub fn collect_table_references(
    sql: &str,
    tokens: &[Token],
) -> std::result::Result<Vec<TableReference>, String> {
    let mut refs = Vec::new();
    let mut pos = 0;

    while pos < tokens.len() {
        let token = &tokens[pos];
        if token.depth == 0 && token.is_keyword(sql, "FROM") && !is_distinct_from(sql, tokens, pos)
        {
            pos = read_from_list(sql, tokens, pos + 1, &mut refs)?;
        } else if token.depth == 0 && token.is_keyword(sql, "JOIN") {
            pos = read_table_factor(sql, tokens, pos + 1, "JOIN", &mut refs)?;
        } else {
            pos += 1;
        }
    }

    Ok(refs)
}

/// `a IS [NOT] DISTINCT FROM b` is a comparison, not a FROM clause.
fn is_distinct_from(sql: &str, tokens: &[Token], from_pos: usize) -> bool {
    from_pos >= 2
        && tokens[from_pos - 1].is_keyword(sql, "DISTINCT")
        && (tokens[from_pos - 2].is_keyword(sql, "IS") || tokens[from_pos - 2].is_keyword(sql, "NOT"))
}

fn read_from_list(
    sql: &str,
    tokens: &[Token],
    mut pos: usize,
    refs: &mut Vec<TableReference>,
) -> std::result::Result<usize, String> {
    loop {
        pos = read_table_factor(sql, tokens, pos, "FROM", refs)?;
        match tokens.get(pos) {
            Some(t) if t.kind == TokenKind::Comma => pos += 1,
            _ => return Ok(pos),
        }
    }
}

/// Reads `name[.name...] [[AS] alias]` starting at `pos`.
fn read_table_factor(
    sql: &str,
    tokens: &[Token],
    mut pos: usize,
    keyword: &str,
    refs: &mut Vec<TableReference>,
) -> std::result::Result<usize, String> {
    let unsupported = || format!("unsupported table reference after {}", keyword);

    let first = tokens
        .get(pos)
        .filter(|t| t.is_identifier())
        .ok_or_else(unsupported)?;
    let mut name = identifier_name(sql, first);
    pos += 1;

    while let (Some(dot), Some(part)) = (tokens.get(pos), tokens.get(pos + 1)) {
        if dot.kind != TokenKind::Dot || !part.is_identifier() {
            break;
        }
        name.push('.');
        name.push_str(&identifier_name(sql, part));
        pos += 2;
    }

    // A trailing dot or a call like `generate_series(...)` is not a table.
    if matches!(
        tokens.get(pos).map(|t| t.kind),
        Some(TokenKind::Dot) | Some(TokenKind::LParen)
    ) {
        return Err(unsupported());
    }

    let mut alias = None;
    if let Some(next) = tokens.get(pos) {
        if next.is_keyword(sql, "AS") {
            let alias_token = tokens
                .get(pos + 1)
                .filter(|t| t.is_identifier())
                .ok_or_else(unsupported)?;
            alias = Some(alias_token.text(sql).to_string());
            pos += 2;
        } else if next.kind == TokenKind::QuotedIdent
            || (next.kind == TokenKind::Word
                && !NON_ALIAS_KEYWORDS
                    .iter()
                    .any(|kw| next.text(sql).eq_ignore_ascii_case(kw)))
        {
            alias = Some(next.text(sql).to_string());
            pos += 1;
        }
    }

    // Column alias lists, `p(a, b)`, rename columns we cannot track.
    if alias.is_some() && tokens.get(pos).map(|t| t.kind) == Some(TokenKind::LParen) {
        return Err(unsupported());
    }

    refs.push(TableReference::new(name, alias));
    Ok(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::tokenizer::tokenize;

    fn refs(sql: &str) -> Vec<(String, String)> {
        let tokens = tokenize(sql).unwrap();
        collect_table_references(sql, &tokens)
            .unwrap()
            .into_iter()
            .map(|r| (r.table_name, r.alias))
            .collect()
    }

    fn pair(table: &str, alias: &str) -> (String, String) {
        (table.to_string(), alias.to_string())
    }

    fn error(sql: &str) -> String {
        let tokens = tokenize(sql).unwrap();
        collect_table_references(sql, &tokens).unwrap_err()
    }

    #[test]
    fn test_single_table_without_alias() {
        assert_eq!(
            refs("SELECT * FROM patients"),
            vec![pair("patients", "patients")]
        );
    }

    #[test]
    fn test_alias_forms() {
        assert_eq!(refs("SELECT * FROM patients p"), vec![pair("patients", "p")]);
        assert_eq!(
            refs("SELECT * FROM patients AS pt WHERE pt.name = 'x'"),
            vec![pair("patients", "pt")]
        );
    }

    #[test]
    fn test_joins() {
        assert_eq!(
            refs(
                "SELECT p.name FROM patients p \
                 LEFT JOIN orders o ON o.patient_id = p.patient_id \
                 JOIN reservations ON reservations.patient_id = p.patient_id"
            ),
            vec![
                pair("patients", "p"),
                pair("orders", "o"),
                pair("reservations", "reservations"),
            ]
        );
    }

    #[test]
    fn test_comma_separated_from_list() {
        assert_eq!(
            refs("SELECT * FROM patients p, admin_users a WHERE a.id = p.patient_id"),
            vec![pair("patients", "p"), pair("admin_users", "a")]
        );
    }

    #[test]
    fn test_case_is_normalized() {
        assert_eq!(
            refs("select * from PATIENTS P join Orders o on o.patient_id = P.patient_id"),
            vec![pair("patients", "P"), pair("orders", "o")]
        );
    }

    #[test]
    fn test_schema_qualified_name_is_kept() {
        assert_eq!(
            refs("SELECT * FROM public.patients"),
            vec![pair("public.patients", "public.patients")]
        );
    }

    #[test]
    fn test_quoted_table_keeps_case() {
        assert_eq!(
            refs(r#"SELECT * FROM "Patients""#),
            vec![pair("Patients", "Patients")]
        );
    }

    #[test]
    fn test_from_inside_function_is_ignored() {
        assert_eq!(
            refs("SELECT EXTRACT(YEAR FROM p.birth_date) FROM patients p"),
            vec![pair("patients", "p")]
        );
    }

    #[test]
    fn test_is_distinct_from_is_ignored() {
        assert_eq!(
            refs("SELECT * FROM orders o WHERE o.status IS DISTINCT FROM 'void'"),
            vec![pair("orders", "o")]
        );
    }

    #[test]
    fn test_no_from_clause() {
        assert!(refs("SELECT 1").is_empty());
    }

    #[test]
    fn test_derived_table_is_error() {
        assert_eq!(
            error("SELECT * FROM (SELECT 1) t"),
            "unsupported table reference after FROM"
        );
    }

    #[test]
    fn test_table_function_is_error() {
        assert_eq!(
            error("SELECT * FROM generate_series(1, 10)"),
            "unsupported table reference after FROM"
        );
    }

    #[test]
    fn test_join_without_table_is_error() {
        assert_eq!(
            error("SELECT * FROM patients p JOIN 'x'"),
            "unsupported table reference after JOIN"
        );
    }

    #[test]
    fn test_column_alias_list_is_error() {
        assert!(error("SELECT * FROM patients p(a, b)").contains("FROM"));
    }

    fn nested(sql: &str) -> bool {
        has_nested_query(sql, &tokenize(sql).unwrap())
    }

    #[test]
    fn test_nested_query_detection() {
        assert!(nested("SELECT * FROM patients WHERE x IN (SELECT 1)"));
        assert!(nested("SELECT * FROM patients p WHERE EXISTS (TABLE admin_users)"));
        assert!(nested("SELECT * FROM patients p WHERE p.sex IN (VALUES ('F'))"));
        assert!(nested("SELECT * FROM patients p WHERE p.id = ANY((table orders))"));
        assert!(!nested("SELECT * FROM patients p WHERE p.sex IN ('F', 'M')"));
        assert!(!nested("SELECT count(*) FROM patients"));
    }
}
