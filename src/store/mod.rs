//! Persistence layer.
//!
//! Conversion jobs and cached results are persisted through the [`JobStore`]
//! and [`CacheStore`] traits. The SQLite implementations use sqlx with WAL
//! mode; the in-memory implementations back tests and non-durable embedding.

pub mod cache;
pub mod job;
pub mod memory;
pub mod models;

pub use cache::{CacheStore, SqlxCacheStore};
pub use job::{JobStore, JobTimings, SqlxJobStore};
pub use memory::{MemoryCacheStore, MemoryJobStore};

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};

use crate::Result;

/// Database connection pool type alias.
pub type DbPool = Pool<Sqlite>;

/// Default connection pool size.
const DEFAULT_POOL_SIZE: u32 = 5;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

/// Initialize the SQLite connection pool with WAL mode.
///
/// `database_url` is a SQLite URL such as `sqlite:docpress.db?mode=rwc`.
pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(DEFAULT_POOL_SIZE)
        .connect_with(options)
        .await?;

    tracing::debug!("Initialized SQLite pool for {}", database_url);
    Ok(pool)
}

/// Create the schema if it does not exist yet.
pub async fn init_schema(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversion_job (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            member_id TEXT,
            status TEXT NOT NULL,
            stage TEXT NOT NULL,
            priority TEXT NOT NULL,
            progress INTEGER NOT NULL DEFAULT 0,
            retry_count INTEGER NOT NULL DEFAULT 0,
            total_pages INTEGER,
            processed_pages INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            estimated_completion TEXT,
            error_message TEXT,
            result_data TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_document_status
         ON conversion_job (document_id, status)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_status_created
         ON conversion_job (status, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversion_cache (
            document_id TEXT PRIMARY KEY,
            result TEXT NOT NULL,
            document_version TEXT,
            created_at TEXT NOT NULL,
            last_accessed_at TEXT NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 0,
            expires_at TEXT NOT NULL,
            size_bytes INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_cache_expires
         ON conversion_cache (expires_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
