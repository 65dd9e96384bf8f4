// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process query evaluation.
//!
//! Used by the in-memory stores, which stand in for RediSearch and SQL in
//! tests and demos. Semantics follow the translators. Text operators ignore
//! case, and so does `Equals` on login, url and domain. Ranges are inclusive
//! millis.

use std::cmp::Ordering;

use super::paging::{SortDirection, SortField, SortSpec};
use super::query_builder::{FieldOperator, FieldQuery, Query, QueryNode, QueryValue};
use crate::record::{fields, CanonicalRecord, IndexDocument};

/// Anything a [`Query`] can be evaluated against.
pub trait SearchDocument {
    fn id(&self) -> &str;
    fn text_field(&self, name: &str) -> Option<&str>;
    fn timestamp_millis(&self) -> Option<i64>;
}

impl SearchDocument for CanonicalRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn text_field(&self, name: &str) -> Option<&str> {
        match name {
            fields::ID => Some(&self.id),
            fields::LOGIN => Some(&self.login),
            fields::PASSWORD => Some(&self.password),
            fields::URL => Some(&self.url),
            fields::DOMAIN => Some(&self.domain),
            _ => None,
        }
    }

    fn timestamp_millis(&self) -> Option<i64> {
        self.timestamp.map(|t| t.timestamp_millis())
    }
}

impl SearchDocument for IndexDocument {
    fn id(&self) -> &str {
        &self.id
    }

    fn text_field(&self, name: &str) -> Option<&str> {
        match name {
            fields::ID => Some(&self.id),
            fields::LOGIN => Some(&self.login),
            fields::PASSWORD => Some(&self.password),
            fields::URL => Some(&self.url),
            fields::DOMAIN => self.metadata.get(fields::DOMAIN).and_then(|v| v.as_str()),
            _ => None,
        }
    }

    fn timestamp_millis(&self) -> Option<i64> {
        self.timestamp.map(|t| t.timestamp_millis())
    }
}

/// Evaluate `query` against a single document.
pub fn matches<D: SearchDocument + ?Sized>(query: &Query, doc: &D) -> bool {
    matches_node(&query.root, doc)
}

fn matches_node<D: SearchDocument + ?Sized>(node: &QueryNode, doc: &D) -> bool {
    match node {
        QueryNode::MatchAll => true,
        QueryNode::Field(field) => matches_field(field, doc),
        QueryNode::And(nodes) => nodes.iter().all(|n| matches_node(n, doc)),
        QueryNode::Or(nodes) => nodes.iter().any(|n| matches_node(n, doc)),
        QueryNode::Not(inner) => !matches_node(inner, doc),
    }
}

fn matches_field<D: SearchDocument + ?Sized>(field: &FieldQuery, doc: &D) -> bool {
    if field.field == fields::TIMESTAMP {
        let Some(ts) = doc.timestamp_millis() else {
            return false;
        };
        return match &field.value {
            QueryValue::Range { min, max } => {
                min.map_or(true, |m| ts >= m) && max.map_or(true, |m| ts <= m)
            }
            QueryValue::Text(text) => text.parse::<i64>().map_or(false, |v| v == ts),
        };
    }

    let (Some(value), QueryValue::Text(needle)) = (doc.text_field(&field.field), &field.value)
    else {
        return false;
    };

    match field.operator {
        FieldOperator::Equals if folds_case(&field.field) => value.to_lowercase() == needle.to_lowercase(),
        FieldOperator::Equals => value == needle,
        FieldOperator::Contains => value.to_lowercase().contains(&needle.to_lowercase()),
        FieldOperator::Prefix => value.to_lowercase().starts_with(&needle.to_lowercase()),
        FieldOperator::Wildcard => glob_match(&needle.to_lowercase(), &value.to_lowercase()),
        FieldOperator::Range => false,
    }
}

/// Fields whose exact match ignores case, as the index's login TAG does.
fn folds_case(field: &str) -> bool {
    field == fields::LOGIN || field == fields::URL || field == fields::DOMAIN
}

/// Glob match supporting `*` (any run, including empty) and `?` (exactly one char).
///
/// Case-sensitive; callers lowercase both sides when they want otherwise.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    // Last `*` seen and the text position it was tried against
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

/// Compare two documents by `sort`, tie-breaking on id so ordering is total.
pub fn compare_documents<D: SearchDocument + ?Sized>(a: &D, b: &D, sort: &SortSpec) -> Ordering {
    let primary = match sort.field {
        SortField::Timestamp => a.timestamp_millis().cmp(&b.timestamp_millis()),
        SortField::Login | SortField::Url => {
            let name = sort.field.as_str();
            a.text_field(name).cmp(&b.text_field(name))
        }
    };
    let primary = match sort.direction {
        SortDirection::Asc => primary,
        SortDirection::Desc => primary.reverse(),
    };
    primary.then_with(|| a.id().cmp(b.id()))
}

pub fn sort_documents<D: SearchDocument>(docs: &mut [D], sort: &SortSpec) {
    docs.sort_by(|a, b| compare_documents(a, b, sort));
}
