// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

use crate::storage::traits::StorageError;

/// Errors surfaced to callers of [`ExposureEngine::resolve`](crate::ExposureEngine::resolve).
///
/// "No results" is never an error; it is `Ok` with an empty list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Rejected before any store was contacted
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The index gave nothing and the source store could not be reached either
    #[error("Source store unavailable: {0}")]
    SourceUnavailable(#[source] StorageError),
}

impl ResolveError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidQuery(reason.into())
    }

    pub fn is_invalid_query(&self) -> bool {
        matches!(self, Self::InvalidQuery(_))
    }
}

impl From<StorageError> for ResolveError {
    fn from(err: StorageError) -> Self {
        Self::SourceUnavailable(err)
    }
}
