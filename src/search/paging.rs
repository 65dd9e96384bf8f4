// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sort and page parameters shared by every store.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::record::fields;

/// Sortable fields. Each is SORTABLE in the index schema and a column in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Timestamp,
    Login,
    Url,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timestamp => fields::TIMESTAMP,
            Self::Login => fields::LOGIN,
            Self::Url => fields::URL,
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamp" => Ok(Self::Timestamp),
            "login" => Ok(Self::Login),
            "url" => Ok(Self::Url),
            other => Err(format!("unsupported sort field '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[serde(alias = "asc")]
    Asc,
    #[default]
    #[serde(alias = "desc")]
    Desc,
}

impl SortDirection {
    /// Keyword shared by SQL `ORDER BY` and RediSearch `SORTBY`.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    pub sort: SortSpec,
}

impl PageRequest {
    pub fn new(page: u32, size: u32, sort: SortSpec) -> Self {
        Self { page, size, sort }
    }

    /// Items to skip before this page starts.
    pub fn offset(&self) -> u64 {
        self.page as u64 * self.size as u64
    }

    /// Items needed from each shard to assemble this page after a merge.
    pub fn window(&self) -> u64 {
        (self.page as u64 + 1) * self.size as u64
    }

    /// Slice the requested page out of an already sorted list.
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        items.into_iter().skip(offset).take(self.size as usize).collect()
    }
}

/// One page of results plus the total match count across all pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

impl<T> Page<T> {
    pub fn empty(request: &PageRequest) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: request.page,
            size: request.size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            size: self.size,
        }
    }
}
