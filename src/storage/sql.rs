// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL source-of-truth store.
//!
//! One row per breach record:
//! ```sql
//! CREATE TABLE breach_records (
//!   id VARCHAR(64) PRIMARY KEY,
//!   triple_hash CHAR(64) NOT NULL UNIQUE,  -- sha-256 of (login, password, url)
//!   login, password, url, domain,
//!   metadata TEXT,                         -- JSON object as text
//!   timestamp BIGINT NULL,                 -- observed-at, epoch millis
//!   created_at BIGINT NOT NULL,
//!   updated_at BIGINT NOT NULL,
//!   source_tag VARCHAR(255) NULL
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! MySQL TEXT columns come back as BLOB through the `Any` driver, so text is
//! read as `String` first and `Vec<u8>` second.

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, Row};
use tracing::debug;

use super::traits::{SourceStore, StorageError};
use crate::record::{record_id, CanonicalRecord};
use crate::resilience::retry::{retry, RetryConfig};
use crate::search::{Page, PageRequest, Query, SqlParam, SqlQuery, SqlTranslator};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

const TABLE: &str = "breach_records";
const COLUMNS: &str =
    "id, login, password, url, domain, metadata, timestamp, created_at, updated_at, source_tag";

// Keep IN (...) lists well under driver placeholder limits
const ID_CHUNK_SIZE: usize = 500;

type AnyQuery<'q> = sqlx::query::Query<'q, Any, AnyArguments<'q>>;

pub struct SqlSourceStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlSourceStore {
    /// Connect with startup-mode retry (fails fast if config is wrong).
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_max_connections(connection_string, 20).await
    }

    pub async fn with_max_connections(connection_string: &str, max_connections: u32) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(max_connections.max(1))
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))
        })
        .await?;

        let store = Self { pool, is_sqlite };

        if is_sqlite {
            store.enable_wal_mode().await?;
        }

        store.init_schema().await?;
        Ok(store)
    }

    /// Get a clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let statements: &[&str] = if self.is_sqlite {
            &[
                r#"
                CREATE TABLE IF NOT EXISTS breach_records (
                    id TEXT PRIMARY KEY,
                    triple_hash TEXT NOT NULL UNIQUE,
                    login TEXT NOT NULL,
                    password TEXT NOT NULL,
                    url TEXT NOT NULL,
                    domain TEXT NOT NULL,
                    metadata TEXT,
                    timestamp INTEGER,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    source_tag TEXT
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_breach_login ON breach_records (login)",
                "CREATE INDEX IF NOT EXISTS idx_breach_timestamp ON breach_records (timestamp)",
            ]
        } else {
            &[r#"
                CREATE TABLE IF NOT EXISTS breach_records (
                    id VARCHAR(64) PRIMARY KEY,
                    triple_hash CHAR(64) NOT NULL,
                    login VARCHAR(512) NOT NULL,
                    password VARCHAR(512) NOT NULL,
                    url VARCHAR(2048) NOT NULL,
                    domain VARCHAR(255) NOT NULL,
                    metadata TEXT,
                    timestamp BIGINT NULL,
                    created_at BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL,
                    source_tag VARCHAR(255) NULL,
                    UNIQUE KEY uniq_triple (triple_hash),
                    INDEX idx_login (login),
                    INDEX idx_domain (domain),
                    INDEX idx_timestamp (timestamp)
                )
                "#]
        };

        for sql in statements {
            retry("sql_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(sql)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .await?;
        }

        Ok(())
    }

    fn bind_params<'q>(mut query: AnyQuery<'q>, params: &[SqlParam]) -> AnyQuery<'q> {
        for param in params {
            query = match param {
                SqlParam::Text(s) => query.bind(s.clone()),
                SqlParam::Int(n) => query.bind(*n),
            };
        }
        query
    }

    fn row_to_record(row: &AnyRow) -> Result<CanonicalRecord, StorageError> {
        let metadata = match read_text(row, "metadata") {
            Some(s) if !s.is_empty() => match serde_json::from_str::<Value>(&s) {
                Ok(Value::Object(map)) => map,
                Ok(_) => Map::new(),
                Err(e) => return Err(StorageError::Serialization(e.to_string())),
            },
            _ => Map::new(),
        };

        let required = |col: &str| {
            read_text(row, col).ok_or_else(|| StorageError::Backend(format!("Missing column '{}'", col)))
        };

        Ok(CanonicalRecord {
            id: required("id")?,
            login: required("login")?,
            password: required("password")?,
            url: required("url")?,
            domain: read_text(row, "domain").unwrap_or_default(),
            metadata,
            timestamp: row
                .try_get::<Option<i64>, _>("timestamp")
                .ok()
                .flatten()
                .and_then(from_millis),
            created_at: row.try_get::<i64, _>("created_at").ok().and_then(from_millis).unwrap_or_default(),
            updated_at: row.try_get::<i64, _>("updated_at").ok().and_then(from_millis).unwrap_or_default(),
            source_tag: read_text(row, "source_tag"),
        })
    }

    /// Id of the row already holding this triple, if any.
    async fn id_for_triple(&self, triple_hash: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT id FROM breach_records WHERE triple_hash = ?")
            .bind(triple_hash.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(row.and_then(|r| read_text(&r, "id")))
    }
}

/// Read a text column as String (SQLite) or bytes (MySQL via Any).
fn read_text(row: &AnyRow, col: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(col)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(col)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn map_write_error(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => StorageError::Conflict(db.to_string()),
        other => StorageError::Backend(other.to_string()),
    }
}

#[async_trait]
impl SourceStore for SqlSourceStore {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<CanonicalRecord>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let placeholders: Vec<&str> = (0..chunk.len()).map(|_| "?").collect();
            let sql = format!("SELECT {} FROM {} WHERE id IN ({})", COLUMNS, TABLE, placeholders.join(", "));

            let rows = retry("sql_find_by_ids", &RetryConfig::query(), || async {
                let mut query = sqlx::query(&sql);
                for id in chunk {
                    query = query.bind(id.clone());
                }
                query
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .await?;

            for row in &rows {
                records.push(Self::row_to_record(row)?);
            }
        }

        Ok(records)
    }

    async fn search(&self, query: &Query, page: &PageRequest) -> Result<Page<CanonicalRecord>, StorageError> {
        let SqlQuery { clause, params } = SqlTranslator::translate(query);
        debug!(clause = %clause, "SQL search");

        let count_sql = format!("SELECT COUNT(*) AS cnt FROM {} WHERE {}", TABLE, clause);
        let total: i64 = retry("sql_search_count", &RetryConfig::query(), || async {
            let row = Self::bind_params(sqlx::query(&count_sql), &params)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            row.try_get::<i64, _>("cnt").map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        if total == 0 {
            return Ok(Page::empty(page));
        }

        let page_sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
            COLUMNS,
            TABLE,
            clause,
            page.sort.field.as_str(),
            page.sort.direction.keyword(),
        );
        let limit = page.size as i64;
        let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);

        let rows = retry("sql_search", &RetryConfig::query(), || async {
            Self::bind_params(sqlx::query(&page_sql), &params)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let items = rows.iter().map(Self::row_to_record).collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total: total.max(0) as u64,
            page: page.page,
            size: page.size,
        })
    }

    async fn exists(&self, login: &str, password: &str, url: &str) -> Result<bool, StorageError> {
        let hash = record_id(login, password, url);
        retry("sql_exists", &RetryConfig::query(), || async {
            let row = sqlx::query("SELECT 1 AS one FROM breach_records WHERE triple_hash = ? LIMIT 1")
                .bind(hash.clone())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(row.is_some())
        })
        .await
    }

    async fn upsert(&self, record: &CanonicalRecord) -> Result<(), StorageError> {
        let triple_hash = record_id(&record.login, &record.password, &record.url);

        if let Some(existing) = self.id_for_triple(&triple_hash).await? {
            if existing != record.id {
                return Err(StorageError::Conflict(format!(
                    "triple already stored under id {}",
                    existing
                )));
            }
        }

        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        // created_at is never overwritten
        let sql = if self.is_sqlite {
            "INSERT INTO breach_records (id, triple_hash, login, password, url, domain, metadata, timestamp, created_at, updated_at, source_tag)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                triple_hash = excluded.triple_hash,
                login = excluded.login,
                password = excluded.password,
                url = excluded.url,
                domain = excluded.domain,
                metadata = excluded.metadata,
                timestamp = excluded.timestamp,
                updated_at = excluded.updated_at,
                source_tag = excluded.source_tag"
        } else {
            "INSERT INTO breach_records (id, triple_hash, login, password, url, domain, metadata, timestamp, created_at, updated_at, source_tag)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                triple_hash = VALUES(triple_hash),
                login = VALUES(login),
                password = VALUES(password),
                url = VALUES(url),
                domain = VALUES(domain),
                metadata = VALUES(metadata),
                timestamp = VALUES(timestamp),
                updated_at = VALUES(updated_at),
                source_tag = VALUES(source_tag)"
        };

        sqlx::query(sql)
            .bind(record.id.clone())
            .bind(triple_hash)
            .bind(record.login.clone())
            .bind(record.password.clone())
            .bind(record.url.clone())
            .bind(record.domain.clone())
            .bind(metadata)
            .bind(record.timestamp.map(|t| t.timestamp_millis()))
            .bind(record.created_at.timestamp_millis())
            .bind(record.updated_at.timestamp_millis())
            .bind(record.source_tag.clone())
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{SortDirection, SortField, SortSpec};
    use tempfile::TempDir;

    async fn temp_store() -> (SqlSourceStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("source.db").display());
        let store = SqlSourceStore::new(&url).await.unwrap();
        (store, dir)
    }

    fn dated(login: &str, password: &str, url: &str, month: u32) -> CanonicalRecord {
        CanonicalRecord::new(login, password, url)
            .with_timestamp(Utc.with_ymd_and_hms(2024, month, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_upsert_and_find_by_ids() {
        let (store, _dir) = temp_store().await;
        let record = dated("alice@example.com", "hunter2", "https://example.com", 3)
            .with_metadata("country", "NZ")
            .with_source_tag("combo-2024");

        store.upsert(&record).await.unwrap();

        let found = store
            .find_by_ids(&[record.id.clone(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        let got = &found[0];
        assert_eq!(got.id, record.id);
        assert_eq!(got.password, "hunter2");
        assert_eq!(got.domain, "example.com");
        assert_eq!(got.metadata["country"], "NZ");
        assert_eq!(got.source_tag.as_deref(), Some("combo-2024"));
        assert_eq!(got.timestamp, record.timestamp);
    }

    #[tokio::test]
    async fn test_find_by_empty_ids() {
        let (store, _dir) = temp_store().await;
        assert!(store.find_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let (store, _dir) = temp_store().await;
        let mut record = dated("bob", "pw", "https://example.com", 1);
        store.upsert(&record).await.unwrap();

        record.metadata.insert("note".into(), "updated".into());
        record.updated_at = Utc::now();
        store.upsert(&record).await.unwrap();

        let found = store.find_by_ids(&[record.id.clone()]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata["note"], "updated");
    }

    #[tokio::test]
    async fn test_same_triple_under_new_id_conflicts() {
        let (store, _dir) = temp_store().await;
        let record = dated("bob", "pw", "https://example.com", 1);
        store.upsert(&record).await.unwrap();

        let mut clone = record.clone();
        clone.id = "some-other-id".to_string();
        let err = store.upsert(&clone).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_exists() {
        let (store, _dir) = temp_store().await;
        store.upsert(&dated("bob", "pw", "https://example.com", 1)).await.unwrap();

        assert!(store.exists("bob", "pw", "https://example.com").await.unwrap());
        assert!(!store.exists("bob", "other", "https://example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_search_contains_sorted_and_paged() {
        let (store, _dir) = temp_store().await;
        for month in 1..=5 {
            store
                .upsert(&dated(&format!("user{}@Example.com", month), "pw", "https://example.com", month))
                .await
                .unwrap();
        }
        store.upsert(&dated("other@test.org", "pw", "https://test.org", 6)).await.unwrap();

        let query = Query::contains("login", "example.COM");
        let first = PageRequest::new(0, 2, SortSpec::default());
        let page = store.search(&query, &first).await.unwrap();

        assert_eq!(page.total, 5);
        let logins: Vec<_> = page.items.iter().map(|r| r.login.as_str()).collect();
        assert_eq!(logins, vec!["user5@Example.com", "user4@Example.com"]);

        let last = PageRequest::new(2, 2, SortSpec::default());
        let page = store.search(&query, &last).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].login, "user1@Example.com");
    }

    #[tokio::test]
    async fn test_search_login_ascending() {
        let (store, _dir) = temp_store().await;
        for login in ["carol", "alice", "bob"] {
            store.upsert(&dated(login, "pw", "https://example.com", 1)).await.unwrap();
        }

        let sort = SortSpec::new(SortField::Login, SortDirection::Asc);
        let page = store
            .search(&Query::contains("url", "example"), &PageRequest::new(0, 10, sort))
            .await
            .unwrap();
        let logins: Vec<_> = page.items.iter().map(|r| r.login.as_str()).collect();
        assert_eq!(logins, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_search_no_match_is_empty() {
        let (store, _dir) = temp_store().await;
        store.upsert(&dated("bob", "pw", "https://example.com", 1)).await.unwrap();

        let page = store
            .search(&Query::term("login", "nobody"), &PageRequest::new(0, 10, SortSpec::default()))
            .await
            .unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_exact_login_search_ignores_case() {
        let (store, _dir) = temp_store().await;
        store.upsert(&dated("alice@example.com", "pw", "https://example.com", 1)).await.unwrap();

        let page = store
            .search(&Query::term("login", "Alice@Example.com"), &PageRequest::new(0, 10, SortSpec::default()))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].login, "alice@example.com");
    }

    #[tokio::test]
    async fn test_wildcard_search_treats_underscore_literally() {
        let (store, _dir) = temp_store().await;
        store.upsert(&dated("a_b", "pw", "https://example.com", 1)).await.unwrap();
        store.upsert(&dated("axb", "pw", "https://example.com", 1)).await.unwrap();

        let page = store
            .search(&Query::wildcard("login", "a_*"), &PageRequest::new(0, 10, SortSpec::default()))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].login, "a_b");
    }
}
