//! Job manager: the durable state machine for conversion jobs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::RetryConfig;
use crate::job::model::{ConversionJob, JobMetrics, JobPriority, JobProgress, JobStage, JobStatus, JobUpdate};
use crate::orchestrator::batch::BatchProgress;
use crate::store::JobStore;
use crate::{Error, Result};

/// Rolling window for job metrics.
const METRICS_WINDOW_HOURS: i64 = 24;

/// Observer notified on job and batch progress changes.
///
/// Injected explicitly; the default wiring uses [`NoopProgressBroadcaster`].
/// Notification is fire-and-forget: implementations must not fail the
/// underlying job operation, so the methods return nothing.
#[async_trait]
pub trait ProgressBroadcaster: Send + Sync {
    async fn job_updated(&self, job: &ConversionJob);
    async fn batch_updated(&self, progress: &BatchProgress);
}

/// Broadcaster that does nothing.
#[derive(Debug, Default)]
pub struct NoopProgressBroadcaster;

#[async_trait]
impl ProgressBroadcaster for NoopProgressBroadcaster {
    async fn job_updated(&self, _job: &ConversionJob) {}
    async fn batch_updated(&self, _progress: &BatchProgress) {}
}

/// Compute the capped exponential backoff delay for a retry attempt.
pub(crate) fn backoff_delay(config: &RetryConfig, retry_count: u32) -> Duration {
    let raw = config.initial_delay_secs as f64
        * config.backoff_multiplier.powi(retry_count.min(31) as i32);
    let capped = raw.min(config.max_delay_secs as f64);
    Duration::milliseconds((capped * 1000.0) as i64)
}

/// Wraps the job store with domain state-machine logic: creation dedup,
/// stage/progress mapping, retry bookkeeping, and metrics aggregation.
pub struct JobManager {
    store: Arc<dyn JobStore>,
    retry: RetryConfig,
    broadcaster: Arc<dyn ProgressBroadcaster>,
}

impl JobManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        retry: RetryConfig,
        broadcaster: Arc<dyn ProgressBroadcaster>,
    ) -> Self {
        Self {
            store,
            retry,
            broadcaster,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn broadcaster(&self) -> &Arc<dyn ProgressBroadcaster> {
        &self.broadcaster
    }

    /// Create a job for a document, or return the existing active one.
    ///
    /// At most one job per document may be queued or processing at a time;
    /// the lookup-before-create enforces that invariant.
    pub async fn create_job(
        &self,
        document_id: &str,
        priority: JobPriority,
        member_id: Option<&str>,
    ) -> Result<ConversionJob> {
        if let Some(existing) = self.store.find_active_by_document(document_id).await? {
            debug!(
                document_id = %document_id,
                job_id = %existing.id,
                "Reusing active job for document"
            );
            return Ok(existing);
        }

        let mut job = ConversionJob::new(document_id, priority);
        if let Some(member_id) = member_id {
            job.member_id = Some(member_id.to_string());
        }
        self.store.create_job(&job).await?;
        info!(
            document_id = %document_id,
            job_id = %job.id,
            priority = %priority.as_str(),
            "Created conversion job"
        );
        Ok(job)
    }

    /// Fetch a job by id, failing when it does not exist.
    pub async fn get_job(&self, job_id: &str) -> Result<ConversionJob> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| Error::not_found("ConversionJob", job_id))
    }

    /// Apply a partial update to a job.
    ///
    /// Progress is derived from the stage when the caller supplies a stage
    /// without an explicit progress. `started_at` is stamped on the first
    /// transition into processing, `completed_at` on completed/failed.
    pub async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<ConversionJob> {
        let mut job = self.get_job(job_id).await?;
        let now = Utc::now();

        if let Some(status) = update.status {
            if status == JobStatus::Processing && job.started_at.is_none() {
                job.started_at = Some(now);
            }
            if matches!(status, JobStatus::Completed | JobStatus::Failed)
                && job.completed_at.is_none()
            {
                job.completed_at = Some(now);
            }
            job.status = status;
        }

        if let Some(stage) = update.stage {
            job.stage = stage;
            job.progress = update.progress.unwrap_or_else(|| stage.progress_percent());
        } else if let Some(progress) = update.progress {
            job.progress = progress.min(100);
        }

        if let Some(total_pages) = update.total_pages {
            job.total_pages = Some(total_pages);
        }
        if let Some(processed_pages) = update.processed_pages {
            job.processed_pages = Some(processed_pages);
        }
        if let Some(error_message) = update.error_message {
            job.error_message = Some(error_message);
        }
        if let Some(result_data) = update.result_data {
            job.result_data = Some(result_data);
        }

        job.updated_at = now;
        self.store.update_job(&job).await?;
        self.broadcaster.job_updated(&job).await;
        Ok(job)
    }

    /// Record a failure for a job.
    ///
    /// Below the retry ceiling (and when `should_retry` holds) the job goes
    /// back to queued with an exponential-backoff `estimated_completion`
    /// gate; otherwise it becomes terminally failed.
    pub async fn mark_job_failed(
        &self,
        job_id: &str,
        message: &str,
        should_retry: bool,
    ) -> Result<ConversionJob> {
        let mut job = self.get_job(job_id).await?;
        let now = Utc::now();

        if should_retry && job.retry_count < self.retry.max_retries {
            let delay = backoff_delay(&self.retry, job.retry_count);
            job.status = JobStatus::Queued;
            job.stage = JobStage::Queued;
            job.progress = 0;
            job.retry_count += 1;
            job.estimated_completion = Some(now + delay);
            job.error_message = Some(message.to_string());
            job.updated_at = now;
            self.store.update_job(&job).await?;
            warn!(
                job_id = %job_id,
                retry_count = job.retry_count,
                delay_secs = delay.num_seconds(),
                "Job failed, scheduled for retry: {}",
                message
            );
        } else {
            job.status = JobStatus::Failed;
            job.stage = JobStage::Failed;
            job.progress = JobStage::Failed.progress_percent();
            job.completed_at = Some(now);
            job.estimated_completion = None;
            job.error_message = Some(message.to_string());
            job.updated_at = now;
            self.store.update_job(&job).await?;
            warn!(job_id = %job_id, "Job failed terminally: {}", message);
        }

        self.broadcaster.job_updated(&job).await;
        Ok(job)
    }

    /// Progress for a document: the active job's if one exists, otherwise
    /// the most recent job's, otherwise `None`.
    pub async fn get_progress(&self, document_id: &str) -> Result<Option<JobProgress>> {
        if let Some(active) = self.store.find_active_by_document(document_id).await? {
            return Ok(Some(JobProgress::from(&active)));
        }
        Ok(self
            .store
            .find_latest_by_document(document_id)
            .await?
            .map(|job| JobProgress::from(&job)))
    }

    /// The most recent completed job for a document inside a freshness
    /// window, if it still carries its result payload.
    pub async fn find_recent_completed(
        &self,
        document_id: &str,
        window: Duration,
    ) -> Result<Option<ConversionJob>> {
        let Some(job) = self.store.find_latest_by_document(document_id).await? else {
            return Ok(None);
        };
        if job.status != JobStatus::Completed || job.result_data.is_none() {
            return Ok(None);
        }
        match job.completed_at {
            Some(completed_at) if completed_at > Utc::now() - window => Ok(Some(job)),
            _ => Ok(None),
        }
    }

    /// Oldest dispatchable queued job, priority first then FIFO. Read path
    /// for poll-based dispatch; the orchestrator keeps its own in-memory
    /// ordering for the primary path.
    pub async fn next_queued_job(&self) -> Result<Option<ConversionJob>> {
        self.store.next_queued_job(Utc::now()).await
    }

    /// Job metrics over the rolling 24-hour window.
    pub async fn get_metrics(&self) -> Result<JobMetrics> {
        let since = Utc::now() - Duration::hours(METRICS_WINDOW_HOURS);
        let queue_depth = self.store.count_by_status(JobStatus::Queued).await?;
        let active_jobs = self.store.count_by_status(JobStatus::Processing).await?;
        let timings = self.store.aggregate_timings(since).await?;

        let terminal = timings.completed + timings.failed;
        let (success_rate, failure_rate) = if terminal > 0 {
            (
                timings.completed as f64 / terminal as f64,
                timings.failed as f64 / terminal as f64,
            )
        } else {
            (0.0, 0.0)
        };

        Ok(JobMetrics {
            queue_depth,
            active_jobs,
            average_processing_secs: timings.average_processing_secs,
            success_rate,
            failure_rate,
        })
    }

    /// Purge terminal jobs older than the cutoff. Returns the purge count.
    pub async fn cleanup_old_jobs(&self, older_than_days: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(older_than_days as i64);
        let deleted = self.store.delete_older_than(cutoff).await?;
        if deleted > 0 {
            info!(
                "Purged {} old jobs (older than {} days)",
                deleted, older_than_days
            );
        }
        Ok(deleted)
    }

    /// Startup recovery: jobs left in processing by a crash or shutdown are
    /// reset to queued so the dispatch loop picks them up again.
    pub async fn recover(&self) -> Result<u64> {
        let reset = self.store.reset_processing_jobs().await?;
        if reset > 0 {
            info!("Reset {} interrupted jobs to queued", reset);
        }
        Ok(reset)
    }

    /// Documents with completed conversions since `since`, most recent first.
    pub async fn recently_completed_documents(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>> {
        self.store.recently_completed_documents(since, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJobStore;

    fn manager_with(retry: RetryConfig) -> JobManager {
        JobManager::new(
            Arc::new(MemoryJobStore::new()),
            retry,
            Arc::new(NoopProgressBroadcaster),
        )
    }

    fn manager() -> JobManager {
        manager_with(RetryConfig::default())
    }

    #[test]
    fn test_backoff_delay_growth_and_cap() {
        let retry = RetryConfig::default(); // 10s initial, x2, 300s cap
        assert_eq!(backoff_delay(&retry, 0).num_seconds(), 10);
        assert_eq!(backoff_delay(&retry, 1).num_seconds(), 20);
        assert_eq!(backoff_delay(&retry, 2).num_seconds(), 40);
        assert_eq!(backoff_delay(&retry, 10).num_seconds(), 300);
    }

    #[tokio::test]
    async fn test_create_job_dedup() {
        let manager = manager();
        let first = manager
            .create_job("doc-1", JobPriority::Normal, None)
            .await
            .unwrap();
        let second = manager
            .create_job("doc-1", JobPriority::High, None)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_update_derives_progress_from_stage() {
        let manager = manager();
        let job = manager
            .create_job("doc-1", JobPriority::Normal, None)
            .await
            .unwrap();

        let updated = manager
            .update_job(
                &job.id,
                JobUpdate::new()
                    .with_status(JobStatus::Processing)
                    .with_stage(JobStage::ProcessingPages),
            )
            .await
            .unwrap();
        assert_eq!(updated.progress, 40);
        assert!(updated.started_at.is_some());
        assert!(updated.completed_at.is_none());

        let done = manager
            .update_job(
                &job.id,
                JobUpdate::new()
                    .with_status(JobStatus::Completed)
                    .with_stage(JobStage::Completed),
            )
            .await
            .unwrap();
        assert_eq!(done.progress, 100);
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_explicit_progress_wins_over_stage() {
        let manager = manager();
        let job = manager
            .create_job("doc-1", JobPriority::Normal, None)
            .await
            .unwrap();
        let updated = manager
            .update_job(
                &job.id,
                JobUpdate::new()
                    .with_stage(JobStage::ProcessingPages)
                    .with_progress(55),
            )
            .await
            .unwrap();
        assert_eq!(updated.progress, 55);
    }

    #[tokio::test]
    async fn test_mark_failed_retries_then_terminal() {
        let manager = manager();
        let job = manager
            .create_job("doc-1", JobPriority::Normal, None)
            .await
            .unwrap();

        // Failures 1-3 reschedule with growing backoff.
        let mut last_gate = Utc::now();
        for attempt in 1..=3u32 {
            let failed = manager
                .mark_job_failed(&job.id, "worker crashed", true)
                .await
                .unwrap();
            assert_eq!(failed.status, JobStatus::Queued);
            assert_eq!(failed.retry_count, attempt);
            let gate = failed.estimated_completion.unwrap();
            assert!(gate > last_gate);
            last_gate = gate;
        }

        // Fourth failure exceeds the ceiling.
        let terminal = manager
            .mark_job_failed(&job.id, "worker crashed", true)
            .await
            .unwrap();
        assert_eq!(terminal.status, JobStatus::Failed);
        assert_eq!(terminal.stage, JobStage::Failed);
        assert!(terminal.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_mark_failed_no_retry() {
        let manager = manager();
        let job = manager
            .create_job("doc-1", JobPriority::Normal, None)
            .await
            .unwrap();
        let failed = manager
            .mark_job_failed(&job.id, "fatal", false)
            .await
            .unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_mark_failed_unknown_job() {
        let manager = manager();
        let err = manager
            .mark_job_failed("missing", "oops", true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_progress_prefers_active() {
        let manager = manager();
        assert!(manager.get_progress("doc-1").await.unwrap().is_none());

        let job = manager
            .create_job("doc-1", JobPriority::Normal, None)
            .await
            .unwrap();
        let progress = manager.get_progress("doc-1").await.unwrap().unwrap();
        assert_eq!(progress.job_id, job.id);
        assert_eq!(progress.status, JobStatus::Queued);
    }
}
