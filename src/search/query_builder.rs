// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query Builder - AST for search queries
//!
//! Provides an engine-agnostic way to describe a breach search. The same AST
//! is translated to RediSearch FT.SEARCH syntax for the index, to a SQL WHERE
//! clause for the source store, and evaluated in-process by the memory
//! backends.
//!
//! # Example
//!
//! ```rust
//! use exposure_engine::search::{Query, QueryBuilder};
//!
//! // Exact login lookup
//! let query = Query::term("login", "alice@example.com");
//!
//! // Several constraints, all required
//! let query = QueryBuilder::new()
//!     .contains("url", "example.com")
//!     .range("timestamp", Some(1_700_000_000_000), None)
//!     .build_and();
//!
//! // Either field may match
//! let query = Query::contains("login", "alice").or(Query::contains("url", "alice"));
//! ```

use serde::{Deserialize, Serialize};

/// Search query AST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Root query node
    pub root: QueryNode,
}

impl Query {
    /// Create a new query from a root node
    pub fn new(root: QueryNode) -> Self {
        Self { root }
    }

    /// Matches every document
    pub fn match_all() -> Self {
        Self::new(QueryNode::MatchAll)
    }

    /// Exact term match: @field:{value}
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(QueryNode::field(field, FieldOperator::Equals, value))
    }

    /// Case-insensitive substring match: @field:*value*
    pub fn contains(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(QueryNode::field(field, FieldOperator::Contains, text))
    }

    /// Prefix match for autocomplete: @field:prefix*
    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::new(QueryNode::field(field, FieldOperator::Prefix, prefix))
    }

    /// Glob match with `*` (any run) and `?` (one char)
    pub fn wildcard(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(QueryNode::field(field, FieldOperator::Wildcard, pattern))
    }

    /// Inclusive epoch-millis range: @field:[min max]
    pub fn range(field: impl Into<String>, min: Option<i64>, max: Option<i64>) -> Self {
        Self::new(QueryNode::Field(FieldQuery {
            field: field.into(),
            operator: FieldOperator::Range,
            value: QueryValue::Range { min, max },
        }))
    }

    /// Combine with AND
    pub fn and(self, other: Query) -> Self {
        match self.root {
            QueryNode::MatchAll => other,
            QueryNode::And(mut nodes) => {
                nodes.push(other.root);
                Self::new(QueryNode::And(nodes))
            }
            root => Self::new(QueryNode::And(vec![root, other.root])),
        }
    }

    /// Combine with OR
    pub fn or(self, other: Query) -> Self {
        Self::new(QueryNode::Or(vec![self.root, other.root]))
    }

    /// Negate query
    pub fn negate(self) -> Self {
        Self::new(QueryNode::Not(Box::new(self.root)))
    }
}

/// Query AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryNode {
    /// Every document: `*`
    MatchAll,
    /// Field query: @field:value
    Field(FieldQuery),
    /// Boolean AND: (query1 query2)
    And(Vec<QueryNode>),
    /// Boolean OR: (query1 | query2)
    Or(Vec<QueryNode>),
    /// Boolean NOT: -query
    Not(Box<QueryNode>),
}

impl QueryNode {
    fn field(field: impl Into<String>, operator: FieldOperator, text: impl Into<String>) -> Self {
        QueryNode::Field(FieldQuery {
            field: field.into(),
            operator,
            value: QueryValue::Text(text.into()),
        })
    }
}

/// Field query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuery {
    /// Field name (e.g., "login", "url", "timestamp")
    pub field: String,
    /// Comparison operator
    pub operator: FieldOperator,
    /// Query value
    pub value: QueryValue,
}

/// Field comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOperator {
    /// Exact term match
    Equals,
    /// Substring, case-insensitive
    Contains,
    /// Prefix, case-insensitive
    Prefix,
    /// Glob pattern, case-insensitive
    Wildcard,
    /// Inclusive numeric range
    Range,
}

/// Query value type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    /// Text value
    Text(String),
    /// Epoch-millis range [min, max]; `None` is unbounded
    Range { min: Option<i64>, max: Option<i64> },
}

/// Builder for complex queries
#[derive(Default)]
pub struct QueryBuilder {
    nodes: Vec<QueryNode>,
}

impl QueryBuilder {
    /// Create a new query builder
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add an exact term constraint
    pub fn term(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(Query::term(field, value))
    }

    /// Add a contains constraint
    pub fn contains(self, field: impl Into<String>, text: impl Into<String>) -> Self {
        self.push(Query::contains(field, text))
    }

    /// Add a prefix constraint
    pub fn prefix(self, field: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.push(Query::prefix(field, prefix))
    }

    /// Add a wildcard constraint
    pub fn wildcard(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.push(Query::wildcard(field, pattern))
    }

    /// Add a range constraint
    pub fn range(self, field: impl Into<String>, min: Option<i64>, max: Option<i64>) -> Self {
        self.push(Query::range(field, min, max))
    }

    /// Add an arbitrary sub-query
    pub fn push(mut self, query: Query) -> Self {
        self.nodes.push(query.root);
        self
    }

    /// Build query with AND semantics (all constraints must match)
    pub fn build_and(self) -> Query {
        Self::build(self.nodes, QueryNode::And)
    }

    /// Build query with OR semantics (any constraint can match)
    pub fn build_or(self) -> Query {
        Self::build(self.nodes, QueryNode::Or)
    }

    fn build(mut nodes: Vec<QueryNode>, combine: fn(Vec<QueryNode>) -> QueryNode) -> Query {
        match nodes.len() {
            0 => Query::match_all(),
            1 => Query::new(nodes.remove(0)),
            _ => Query::new(combine(nodes)),
        }
    }
}
