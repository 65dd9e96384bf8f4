// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL Translator
//!
//! Translates Query AST to parameterized SQL WHERE clauses over the
//! `breach_records` table. Works on both SQLite and MySQL.
//!
//! # SQL Syntax Generated
//!
//! ```sql
//! LOWER(login) = ?                       -- Exact match (login, url, domain)
//! password = ?                           -- Exact match, case-sensitive
//! LOWER(url) LIKE ? ESCAPE '!'           -- Contains / prefix / wildcard
//! timestamp >= ? AND timestamp <= ?      -- Range (epoch millis)
//! ```
//!
//! Field names never reach the SQL text directly: they are mapped through a
//! fixed column whitelist, and unknown fields compile to `1 = 0`.

use super::query_builder::{FieldOperator, FieldQuery, Query, QueryNode, QueryValue};
use crate::record::fields;

/// Character used to escape `%`, `_` and itself inside LIKE patterns.
const LIKE_ESCAPE: char = '!';

/// SQL query translator for the source store
pub struct SqlTranslator;

/// SQL query result with parameterized placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    /// The WHERE clause (without "WHERE" keyword)
    pub clause: String,
    /// The parameter values in order
    pub params: Vec<SqlParam>,
}

/// SQL parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
}

impl SqlTranslator {
    /// Translate Query AST to parameterized SQL WHERE clause
    ///
    /// Uses `?` placeholders for parameters (valid for SQLite and MySQL)
    pub fn translate(query: &Query) -> SqlQuery {
        let mut params = Vec::new();
        let clause = Self::translate_node(&query.root, &mut params);
        SqlQuery { clause, params }
    }

    /// Translate Query AST to SQL WHERE clause with inline values
    ///
    /// Warning: Only use for debugging, not for actual queries (SQL injection risk)
    pub fn translate_inline(query: &Query) -> String {
        let SqlQuery { clause, params } = Self::translate(query);

        let mut result = clause;
        for param in params {
            let value = match param {
                SqlParam::Text(s) => format!("'{}'", s.replace('\'', "''")),
                SqlParam::Int(n) => n.to_string(),
            };
            result = result.replacen('?', &value, 1);
        }
        result
    }

    fn translate_node(node: &QueryNode, params: &mut Vec<SqlParam>) -> String {
        match node {
            QueryNode::MatchAll => "1 = 1".to_string(),
            QueryNode::Field(field_query) => Self::translate_field(field_query, params),
            QueryNode::And(nodes) => Self::join(nodes, " AND ", params),
            QueryNode::Or(nodes) => Self::join(nodes, " OR ", params),
            QueryNode::Not(inner) => {
                format!("NOT ({})", Self::translate_node(inner, params))
            }
        }
    }

    fn join(nodes: &[QueryNode], sep: &str, params: &mut Vec<SqlParam>) -> String {
        let parts: Vec<String> = nodes.iter().map(|n| Self::translate_node(n, params)).collect();
        match parts.len() {
            0 => "1 = 1".to_string(),
            1 => parts[0].clone(),
            _ => format!("({})", parts.join(sep)),
        }
    }

    fn translate_field(field: &FieldQuery, params: &mut Vec<SqlParam>) -> String {
        let Some(column) = Self::column(&field.field) else {
            return "1 = 0".to_string();
        };

        match (&field.operator, &field.value) {
            (FieldOperator::Equals, QueryValue::Text(text)) if column == fields::TIMESTAMP => {
                match text.parse::<i64>() {
                    Ok(millis) => {
                        params.push(SqlParam::Int(millis));
                        format!("{} = ?", column)
                    }
                    Err(_) => "1 = 0".to_string(),
                }
            }
            (FieldOperator::Equals, QueryValue::Text(text)) if Self::folds_case(column) => {
                params.push(SqlParam::Text(text.to_lowercase()));
                format!("LOWER({}) = ?", column)
            }
            (FieldOperator::Equals, QueryValue::Text(text)) => {
                params.push(SqlParam::Text(text.clone()));
                format!("{} = ?", column)
            }
            (FieldOperator::Contains, QueryValue::Text(text)) => {
                params.push(SqlParam::Text(format!("%{}%", Self::escape_like(text))));
                Self::like(column)
            }
            (FieldOperator::Prefix, QueryValue::Text(text)) => {
                params.push(SqlParam::Text(format!("{}%", Self::escape_like(text))));
                Self::like(column)
            }
            (FieldOperator::Wildcard, QueryValue::Text(pattern)) => {
                params.push(SqlParam::Text(Self::glob_to_like(pattern)));
                Self::like(column)
            }
            (_, QueryValue::Range { min, max }) => match (min, max) {
                (Some(min_val), Some(max_val)) => {
                    params.push(SqlParam::Int(*min_val));
                    params.push(SqlParam::Int(*max_val));
                    format!("({col} >= ? AND {col} <= ?)", col = column)
                }
                (Some(min_val), None) => {
                    params.push(SqlParam::Int(*min_val));
                    format!("{} >= ?", column)
                }
                (None, Some(max_val)) => {
                    params.push(SqlParam::Int(*max_val));
                    format!("{} <= ?", column)
                }
                (None, None) => "1 = 1".to_string(),
            },
            // Range operator with a text value
            _ => "1 = 0".to_string(),
        }
    }

    fn like(column: &str) -> String {
        format!("LOWER({}) LIKE ? ESCAPE '{}'", column, LIKE_ESCAPE)
    }

    /// Columns compared without regard to case, like the index's TAG/TEXT fields.
    fn folds_case(column: &str) -> bool {
        column == fields::LOGIN || column == fields::URL || column == fields::DOMAIN
    }

    fn column(field: &str) -> Option<&'static str> {
        match field {
            f if f == fields::ID => Some(fields::ID),
            f if f == fields::LOGIN => Some(fields::LOGIN),
            f if f == fields::PASSWORD => Some(fields::PASSWORD),
            f if f == fields::URL => Some(fields::URL),
            f if f == fields::DOMAIN => Some(fields::DOMAIN),
            f if f == fields::TIMESTAMP => Some(fields::TIMESTAMP),
            _ => None,
        }
    }

    /// Lowercase and escape LIKE metacharacters so the value matches literally.
    fn escape_like(value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for c in value.to_lowercase().chars() {
            if c == '%' || c == '_' || c == LIKE_ESCAPE {
                out.push(LIKE_ESCAPE);
            }
            out.push(c);
        }
        out
    }

    fn glob_to_like(pattern: &str) -> String {
        let mut out = String::with_capacity(pattern.len());
        for c in pattern.to_lowercase().chars() {
            match c {
                '*' => out.push('%'),
                '?' => out.push('_'),
                '%' | '_' | LIKE_ESCAPE => {
                    out.push(LIKE_ESCAPE);
                    out.push(c);
                }
                _ => out.push(c),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_query() {
        let sql = SqlTranslator::translate(&Query::term("login", "Alice@Example.com"));
        assert_eq!(sql.clause, "LOWER(login) = ?");
        assert_eq!(sql.params, vec![SqlParam::Text("alice@example.com".to_string())]);
    }

    #[test]
    fn test_password_term_keeps_case() {
        let sql = SqlTranslator::translate(&Query::term("password", "Hunter2"));
        assert_eq!(sql.clause, "password = ?");
        assert_eq!(sql.params, vec![SqlParam::Text("Hunter2".to_string())]);
    }

    #[test]
    fn test_inline_term() {
        let sql = SqlTranslator::translate_inline(&Query::term("login", "o'brien"));
        assert_eq!(sql, "LOWER(login) = 'o''brien'");
    }

    #[test]
    fn test_contains_is_lowercased_and_escaped() {
        let sql = SqlTranslator::translate(&Query::contains("url", "Shop_100%"));
        assert_eq!(sql.clause, "LOWER(url) LIKE ? ESCAPE '!'");
        assert_eq!(sql.params, vec![SqlParam::Text("%shop!_100!%%".to_string())]);
    }

    #[test]
    fn test_prefix_query() {
        let sql = SqlTranslator::translate(&Query::prefix("login", "Admin"));
        assert_eq!(sql.params, vec![SqlParam::Text("admin%".to_string())]);
    }

    #[test]
    fn test_wildcard_maps_glob_to_like() {
        let sql = SqlTranslator::translate(&Query::wildcard("url", "*.Example.?om/a_b"));
        assert_eq!(sql.clause, "LOWER(url) LIKE ? ESCAPE '!'");
        assert_eq!(sql.params, vec![SqlParam::Text("%.example._om/a!_b".to_string())]);
    }

    #[test]
    fn test_range_variants() {
        let both = SqlTranslator::translate(&Query::range("timestamp", Some(1), Some(2)));
        assert_eq!(both.clause, "(timestamp >= ? AND timestamp <= ?)");
        assert_eq!(both.params, vec![SqlParam::Int(1), SqlParam::Int(2)]);

        let lower = SqlTranslator::translate(&Query::range("timestamp", Some(5), None));
        assert_eq!(lower.clause, "timestamp >= ?");

        let upper = SqlTranslator::translate(&Query::range("timestamp", None, Some(5)));
        assert_eq!(upper.clause, "timestamp <= ?");

        let open = SqlTranslator::translate(&Query::range("timestamp", None, None));
        assert_eq!(open.clause, "1 = 1");
        assert!(open.params.is_empty());
    }

    #[test]
    fn test_unknown_field_matches_nothing() {
        let sql = SqlTranslator::translate(&Query::term("login; DROP TABLE x", "a"));
        assert_eq!(sql.clause, "1 = 0");
        assert!(sql.params.is_empty());
    }

    #[test]
    fn test_boolean_composition() {
        let query = Query::contains("login", "bob")
            .or(Query::contains("url", "bob"))
            .and(Query::range("timestamp", Some(10), None));
        let sql = SqlTranslator::translate(&query);
        assert_eq!(
            sql.clause,
            "((LOWER(login) LIKE ? ESCAPE '!' OR LOWER(url) LIKE ? ESCAPE '!') AND timestamp >= ?)"
        );
        assert_eq!(sql.params.len(), 3);
    }

    #[test]
    fn test_not_query() {
        let sql = SqlTranslator::translate(&Query::term("password", "x").negate());
        assert_eq!(sql.clause, "NOT (password = ?)");
    }

    #[test]
    fn test_match_all() {
        assert_eq!(SqlTranslator::translate(&Query::match_all()).clause, "1 = 1");
    }
}
