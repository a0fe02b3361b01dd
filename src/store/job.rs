//! Job store trait and its SQLite implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::Result;
use crate::job::{ConversionJob, JobStatus};
use crate::store::models::JobRow;

/// Aggregate timing figures over a window, computed by the store.
#[derive(Debug, Clone, Default)]
pub struct JobTimings {
    pub completed: u64,
    pub failed: u64,
    pub average_processing_secs: f64,
}

/// Durable persistence contract for conversion jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &ConversionJob) -> Result<()>;
    async fn get_job(&self, id: &str) -> Result<Option<ConversionJob>>;

    /// Find the job for a document that is still queued or processing.
    async fn find_active_by_document(&self, document_id: &str) -> Result<Option<ConversionJob>>;

    /// Find the most recently created job for a document, regardless of state.
    async fn find_latest_by_document(&self, document_id: &str) -> Result<Option<ConversionJob>>;

    async fn update_job(&self, job: &ConversionJob) -> Result<()>;

    /// Select the next dispatchable queued job: highest priority first, FIFO
    /// within a priority, skipping jobs whose backoff gate has not passed.
    async fn next_queued_job(&self, now: DateTime<Utc>) -> Result<Option<ConversionJob>>;

    /// Reset jobs left in processing by a crash or shutdown back to queued.
    async fn reset_processing_jobs(&self) -> Result<u64>;

    /// Delete terminal jobs last updated before the cutoff.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn count_by_status(&self, status: JobStatus) -> Result<u64>;

    /// Completion/failure counts and average processing time since `since`.
    async fn aggregate_timings(&self, since: DateTime<Utc>) -> Result<JobTimings>;

    /// Documents with completed conversions since `since`, most recent first.
    async fn recently_completed_documents(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>>;
}

/// SQLx implementation of [`JobStore`].
pub struct SqlxJobStore {
    pool: SqlitePool,
}

impl SqlxJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for SqlxJobStore {
    async fn create_job(&self, job: &ConversionJob) -> Result<()> {
        let row = JobRow::from_job(job)?;
        sqlx::query(
            r#"
            INSERT INTO conversion_job (
                id, document_id, member_id, status, stage, priority, progress,
                retry_count, total_pages, processed_pages, created_at, updated_at,
                started_at, completed_at, estimated_completion, error_message, result_data
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.document_id)
        .bind(&row.member_id)
        .bind(&row.status)
        .bind(&row.stage)
        .bind(&row.priority)
        .bind(row.progress)
        .bind(row.retry_count)
        .bind(row.total_pages)
        .bind(row.processed_pages)
        .bind(&row.created_at)
        .bind(&row.updated_at)
        .bind(&row.started_at)
        .bind(&row.completed_at)
        .bind(&row.estimated_completion)
        .bind(&row.error_message)
        .bind(&row.result_data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<ConversionJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM conversion_job WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn find_active_by_document(&self, document_id: &str) -> Result<Option<ConversionJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM conversion_job
            WHERE document_id = ? AND status IN ('QUEUED', 'PROCESSING')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn find_latest_by_document(&self, document_id: &str) -> Result<Option<ConversionJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM conversion_job
            WHERE document_id = ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn update_job(&self, job: &ConversionJob) -> Result<()> {
        let row = JobRow::from_job(job)?;
        sqlx::query(
            r#"
            UPDATE conversion_job SET
                status = ?,
                stage = ?,
                priority = ?,
                progress = ?,
                retry_count = ?,
                total_pages = ?,
                processed_pages = ?,
                updated_at = ?,
                started_at = ?,
                completed_at = ?,
                estimated_completion = ?,
                error_message = ?,
                result_data = ?
            WHERE id = ?
            "#,
        )
        .bind(&row.status)
        .bind(&row.stage)
        .bind(&row.priority)
        .bind(row.progress)
        .bind(row.retry_count)
        .bind(row.total_pages)
        .bind(row.processed_pages)
        .bind(&row.updated_at)
        .bind(&row.started_at)
        .bind(&row.completed_at)
        .bind(&row.estimated_completion)
        .bind(&row.error_message)
        .bind(&row.result_data)
        .bind(&row.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn next_queued_job(&self, now: DateTime<Utc>) -> Result<Option<ConversionJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM conversion_job
            WHERE status = 'QUEUED'
              AND (estimated_completion IS NULL OR estimated_completion <= ?)
            ORDER BY
                CASE priority
                    WHEN 'URGENT' THEN 0
                    WHEN 'HIGH' THEN 1
                    WHEN 'NORMAL' THEN 2
                    ELSE 3
                END,
                created_at ASC
            LIMIT 1
            "#,
        )
        .bind(now.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn reset_processing_jobs(&self) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE conversion_job
            SET status = 'QUEUED', stage = 'QUEUED', progress = 0, updated_at = ?
            WHERE status = 'PROCESSING'
            "#,
        )
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM conversion_job
            WHERE status IN ('COMPLETED', 'FAILED', 'CANCELLED') AND updated_at < ?
            "#,
        )
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversion_job WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn aggregate_timings(&self, since: DateTime<Utc>) -> Result<JobTimings> {
        let since_str = since.to_rfc3339();

        let completed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM conversion_job WHERE status = 'COMPLETED' AND completed_at >= ?",
        )
        .bind(&since_str)
        .fetch_one(&self.pool)
        .await?;

        let failed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM conversion_job WHERE status = 'FAILED' AND completed_at >= ?",
        )
        .bind(&since_str)
        .fetch_one(&self.pool)
        .await?;

        let average_processing_secs: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT AVG((julianday(completed_at) - julianday(started_at)) * 86400.0)
            FROM conversion_job
            WHERE status = 'COMPLETED'
              AND completed_at >= ?
              AND started_at IS NOT NULL
            "#,
        )
        .bind(&since_str)
        .fetch_one(&self.pool)
        .await?;

        Ok(JobTimings {
            completed: completed.max(0) as u64,
            failed: failed.max(0) as u64,
            average_processing_secs: average_processing_secs.unwrap_or(0.0),
        })
    }

    async fn recently_completed_documents(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let documents: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT document_id
            FROM conversion_job
            WHERE status = 'COMPLETED' AND completed_at >= ?
            GROUP BY document_id
            ORDER BY MAX(completed_at) DESC
            LIMIT ?
            "#,
        )
        .bind(since.to_rfc3339())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(documents)
    }
}
