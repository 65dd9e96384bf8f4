// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backends.
//!
//! - [`traits`]: the [`SearchIndexStore`](traits::SearchIndexStore) and
//!   [`SourceStore`](traits::SourceStore) seams plus [`StorageError`](traits::StorageError)
//! - [`redis`]: RediSearch month-shard index
//! - [`sql`]: MySQL/SQLite source of truth
//! - [`memory`]: in-process stand-ins with fault injection

pub mod memory;
pub mod redis;
pub mod sql;
pub mod traits;
