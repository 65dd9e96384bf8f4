// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! RediSearch Translator
//!
//! Translates Query AST to RediSearch FT.SEARCH syntax (DIALECT 2).
//!
//! # RediSearch Query Syntax
//!
//! ```text
//! @login:{alice\@example\.com}   - Exact match (login is a TAG field)
//! @url:*example*                 - Contains (one token)
//! @url:"example com"             - Contains (dotted needle, token phrase)
//! @login_text:ali*               - Prefix (login substring/prefix use its TEXT twin)
//! @url:w'*.example.*'            - Wildcard
//! @timestamp:[min max]           - Numeric range
//! query1 query2                  - AND (implicit)
//! query1 | query2                - OR
//! -query                         - NOT
//! ```

use super::index_schema::{LOGIN_TEXT_FIELD, TAG_FIELDS};
use super::query_builder::{FieldOperator, FieldQuery, Query, QueryNode, QueryValue};

/// RediSearch query translator
pub struct RediSearchTranslator;

impl RediSearchTranslator {
    /// Translate Query AST to RediSearch FT.SEARCH syntax
    pub fn translate(query: &Query) -> String {
        Self::translate_node(&query.root)
    }

    fn translate_node(node: &QueryNode) -> String {
        match node {
            QueryNode::MatchAll => "*".to_string(),
            QueryNode::Field(field_query) => Self::translate_field(field_query),
            QueryNode::And(nodes) => {
                let parts: Vec<String> = nodes
                    .iter()
                    .filter(|n| !matches!(n, QueryNode::MatchAll))
                    .map(Self::translate_node)
                    .collect();
                match parts.len() {
                    0 => "*".to_string(),
                    1 => parts[0].clone(),
                    _ => format!("({})", parts.join(" ")),
                }
            }
            QueryNode::Or(nodes) => {
                if nodes.iter().any(|n| matches!(n, QueryNode::MatchAll)) {
                    return "*".to_string();
                }
                let parts: Vec<String> = nodes.iter().map(Self::translate_node).collect();
                match parts.len() {
                    0 => "*".to_string(),
                    1 => parts[0].clone(),
                    _ => format!("({})", parts.join(" | ")),
                }
            }
            QueryNode::Not(inner) => {
                format!("-({})", Self::translate_node(inner))
            }
        }
    }

    fn translate_field(field: &FieldQuery) -> String {
        match (&field.operator, &field.value) {
            (FieldOperator::Equals, QueryValue::Text(text)) => {
                if TAG_FIELDS.contains(&field.field.as_str()) {
                    format!("@{}:{{{}}}", field.field, Self::escape_value(text))
                } else {
                    format!("@{}:({})", field.field, Self::escape_value(text))
                }
            }
            (FieldOperator::Contains, QueryValue::Text(text)) => {
                Self::translate_contains(Self::text_field(&field.field), text)
            }
            (FieldOperator::Prefix, QueryValue::Text(text)) => {
                format!("@{}:{}*", Self::text_field(&field.field), Self::escape_value(text))
            }
            (FieldOperator::Wildcard, QueryValue::Text(pattern)) => {
                format!("@{}:w'{}'", Self::text_field(&field.field), pattern.replace('\'', "\\'"))
            }
            (FieldOperator::Range, QueryValue::Range { min, max }) => {
                let min_str = min.map(|v| v.to_string()).unwrap_or_else(|| "-inf".to_string());
                let max_str = max.map(|v| v.to_string()).unwrap_or_else(|| "+inf".to_string());
                format!("@{}:[{} {}]", field.field, min_str, max_str)
            }
            (FieldOperator::Range, QueryValue::Text(text)) => {
                // Single-point range given as text
                let escaped = Self::escape_value(text);
                format!("@{}:[{} {}]", field.field, escaped, escaped)
            }
            (_, QueryValue::Range { min, max }) => {
                // Non-range operator with range value: treat as range
                Self::translate_field(&FieldQuery {
                    field: field.field.clone(),
                    operator: FieldOperator::Range,
                    value: QueryValue::Range { min: *min, max: *max },
                })
            }
        }
    }

    /// TEXT fields are tokenized on punctuation, so an infix term never spans
    /// a `.` or `@`. A needle with several tokens becomes an exact phrase.
    fn translate_contains(field: &str, text: &str) -> String {
        let tokens = Self::tokenize(text);
        match tokens.as_slice() {
            [] => format!("@{}:*{}*", field, Self::escape_value(text)),
            [token] => format!("@{}:*{}*", field, token),
            _ => format!("@{}:\"{}\"", field, tokens.join(" ")),
        }
    }

    /// Split the way the indexer does: on anything but letters, digits and `_`.
    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    /// TAG fields can't do infix/prefix/wildcard; route to the TEXT twin.
    fn text_field(field: &str) -> &str {
        if field == crate::record::fields::LOGIN {
            LOGIN_TEXT_FIELD
        } else {
            field
        }
    }

    /// Escape every punctuation and whitespace char so values are matched literally.
    fn escape_value(value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for c in value.chars() {
            if !c.is_alphanumeric() && c != '_' {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }
}
