// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search Infrastructure
//!
//! One query AST, three evaluators.
//!
//! # Architecture
//!
//! ```text
//! Query (AST)
//!     ↓
//!     ├─→ RediSearchTranslator → FT.SEARCH syntax      (index shards)
//!     ├─→ SqlTranslator        → parameterized WHERE   (source store)
//!     └─→ matcher::matches     → in-process evaluation (memory stores)
//! ```
//!
//! # Query Language (RediSearch syntax)
//!
//! ```text
//! @login:{alice\@example\.com}      - Exact login (TAG)
//! @url:*example*                    - Contains
//! @url:"example com"                - Contains across punctuation
//! @login_text:ali*                  - Prefix
//! @url:w'*.example.*'               - Wildcard
//! @timestamp:[1700000000000 +inf]   - Range
//! (@login_text:*bob* | @url:*bob*)  - Boolean OR
//! -(@login:{bob})                   - Boolean NOT
//! ```

mod index_schema;
mod matcher;
mod paging;
mod query_builder;
mod redis_translator;
mod sql_translator;

pub use index_schema::{
    document_key, index_name, shard_from_index_name, SearchField, SearchFieldType, SearchIndex,
    LOGIN_TEXT_FIELD, TAG_FIELDS,
};
pub use matcher::{compare_documents, glob_match, matches, sort_documents, SearchDocument};
pub use paging::{Page, PageRequest, SortDirection, SortField, SortSpec};
pub use query_builder::{FieldOperator, FieldQuery, Query, QueryBuilder, QueryNode, QueryValue};
pub use redis_translator::RediSearchTranslator;
pub use sql_translator::{SqlParam, SqlQuery, SqlTranslator};
