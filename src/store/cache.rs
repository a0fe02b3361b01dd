//! Cache store trait and its SQLite implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::Result;
use crate::cache::CachedResult;
use crate::store::models::CacheRow;

/// Durable persistence contract for cached conversion results.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Insert or replace the entry for a document.
    async fn upsert_by_document(&self, entry: &CachedResult) -> Result<()>;

    /// Load up to `limit` unexpired entries, most recently accessed first.
    async fn find_unexpired(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<CachedResult>>;

    /// Delete the entry for a document. Returns false when nothing was there.
    async fn delete_by_document(&self, document_id: &str) -> Result<bool>;

    async fn delete_many(&self, document_ids: &[String]) -> Result<u64>;

    /// Delete all entries past their expiry.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Delete every entry.
    async fn delete_all(&self) -> Result<u64>;
}

/// SQLx implementation of [`CacheStore`].
pub struct SqlxCacheStore {
    pool: SqlitePool,
}

impl SqlxCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for SqlxCacheStore {
    async fn upsert_by_document(&self, entry: &CachedResult) -> Result<()> {
        let row = CacheRow::from_result(entry)?;
        sqlx::query(
            r#"
            INSERT INTO conversion_cache (
                document_id, result, document_version, created_at,
                last_accessed_at, access_count, expires_at, size_bytes
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_id) DO UPDATE SET
                result = excluded.result,
                document_version = excluded.document_version,
                created_at = excluded.created_at,
                last_accessed_at = excluded.last_accessed_at,
                access_count = excluded.access_count,
                expires_at = excluded.expires_at,
                size_bytes = excluded.size_bytes
            "#,
        )
        .bind(&row.document_id)
        .bind(&row.result)
        .bind(&row.document_version)
        .bind(&row.created_at)
        .bind(&row.last_accessed_at)
        .bind(row.access_count)
        .bind(&row.expires_at)
        .bind(row.size_bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_unexpired(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<CachedResult>> {
        let rows = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT * FROM conversion_cache
            WHERE expires_at > ?
            ORDER BY last_accessed_at DESC
            LIMIT ?
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        // A corrupt row is dropped and deleted, never fatal for the load.
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let document_id = row.document_id.clone();
            match row.into_result() {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        document_id = %document_id,
                        error = %e,
                        "Dropping corrupt cache row"
                    );
                    let _ = self.delete_by_document(&document_id).await;
                }
            }
        }
        Ok(entries)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversion_cache WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, document_ids: &[String]) -> Result<u64> {
        let mut deleted = 0u64;
        for document_id in document_ids {
            if self.delete_by_document(document_id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM conversion_cache WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM conversion_cache")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
