//! Centralized conversion orchestration.
//!
//! [`ConversionManager`] is the single entry point for conversion requests:
//! cache lookup, document-level deduplication, priority dispatch under a
//! concurrency cap, retry re-enqueueing, batches, and cancellation all live
//! here. Callers await a [`ConversionOutcome`] through the waiter fan-out
//! rather than polling job state.

pub mod batch;
pub mod queue;
pub mod worker;

pub use batch::{BatchConversionResult, BatchDocumentFailure, BatchProgress, BatchRequest};
pub use queue::{ConversionOutcome, ConversionRequest, PendingCounts};
pub use worker::ConversionWorker;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStats, ResultCache};
use crate::config::ManagerConfig;
use crate::job::{
    ConversionJob, JobManager, JobMetrics, JobPriority, JobProgress, JobStage, JobStatus, JobUpdate,
};
use crate::orchestrator::batch::BatchTracker;
use crate::orchestrator::queue::{
    PendingQueue, QueueItem, Waiter, reject_waiters, resolve_waiters,
};
use crate::{Error, Result};

/// Status of a document's conversion, covering requests that have not been
/// dispatched into a job yet.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversionStatus {
    /// Queued in memory; no job exists yet.
    Pending {
        document_id: String,
        queued_at: DateTime<Utc>,
    },
    /// Backed by a job, active or historical.
    Job(JobProgress),
}

/// Queue depth classification against the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueDepthStatus {
    Normal,
    Warning,
    Critical,
}

impl QueueDepthStatus {
    fn classify(depth: usize, config: &ManagerConfig) -> Self {
        if depth >= config.critical_threshold {
            Self::Critical
        } else if depth >= config.warning_threshold {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}

/// Point-in-time view of the orchestrator's queue and workload.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub counts: PendingCounts,
    pub active_jobs: usize,
    pub running_batches: usize,
    pub average_wait_secs: f64,
    /// Pending depth times average processing time over the concurrency cap.
    pub estimated_wait_secs: f64,
    pub depth: QueueDepthStatus,
}

/// An in-flight conversion. Late-arriving callers attach their waiters here
/// and are resolved together with the original requesters.
struct ActiveConversion {
    job_id: String,
    token: CancellationToken,
    waiters: Mutex<Vec<Waiter>>,
}

struct ManagerInner {
    config: ManagerConfig,
    jobs: Arc<JobManager>,
    cache: Arc<ResultCache>,
    worker: Arc<dyn ConversionWorker>,
    pending: PendingQueue,
    active: DashMap<String, ActiveConversion>,
    batches: BatchTracker,
    shutdown_token: CancellationToken,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
}

/// The conversion orchestrator.
///
/// Cheap to clone; clones share the same queue, active set, and dispatch
/// loop. Constructed with its collaborators injected.
#[derive(Clone)]
pub struct ConversionManager {
    inner: Arc<ManagerInner>,
}

impl ConversionManager {
    pub fn new(
        config: ManagerConfig,
        jobs: Arc<JobManager>,
        cache: Arc<ResultCache>,
        worker: Arc<dyn ConversionWorker>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                jobs,
                cache,
                worker,
                pending: PendingQueue::new(),
                active: DashMap::new(),
                batches: BatchTracker::new(),
                shutdown_token: CancellationToken::new(),
                dispatch_handle: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.inner.jobs
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.inner.cache
    }

    /// Recover interrupted jobs, preload the cache, and start the dispatch
    /// loop.
    pub async fn start(&self) -> Result<()> {
        let recovered = self.inner.jobs.recover().await?;
        let preloaded = self.inner.cache.load_from_store().await?;
        info!(
            "Conversion manager starting (recovered {} jobs, preloaded {} cache entries, max {} concurrent)",
            recovered, preloaded, self.inner.config.max_concurrent_jobs
        );

        let manager = self.clone();
        let token = self.inner.shutdown_token.clone();
        let handle = tokio::spawn(async move {
            let mut tick =
                time::interval(Duration::from_millis(manager.inner.config.dispatch_interval_ms));
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Dispatch loop shutting down");
                        break;
                    }
                    _ = tick.tick() => {
                        manager.dispatch_tick().await;
                    }
                }
            }
        });
        *self.inner.dispatch_handle.lock() = Some(handle);
        Ok(())
    }

    /// Request a conversion and await its outcome.
    ///
    /// Resolution order: cache, pending queue (attach), active conversion
    /// (attach, bounded by the active-wait timeout), recently completed job
    /// (reused and re-cached), and finally a fresh enqueue.
    pub async fn queue_conversion(&self, request: ConversionRequest) -> Result<ConversionOutcome> {
        let document_id = request.document_id.clone();
        if document_id.is_empty() {
            return Err(Error::validation("document_id must not be empty"));
        }

        if let Some(result) = self
            .inner
            .cache
            .get(&document_id, request.document_version.as_deref())
            .await?
        {
            debug!(document_id = %document_id, "Serving conversion from cache");
            return Ok(ConversionOutcome {
                job_id: None,
                document_id,
                result,
                from_cache: true,
            });
        }

        let (tx, rx) = oneshot::channel();

        let tx = match self.inner.pending.attach_waiter(&document_id, tx) {
            Ok(()) => {
                debug!(document_id = %document_id, "Joined pending conversion");
                return self.await_outcome(rx, &document_id).await;
            }
            Err(tx) => tx,
        };

        let tx = match self.attach_active_waiter(&document_id, tx) {
            Ok(()) => {
                debug!(document_id = %document_id, "Joined in-flight conversion");
                let waited_secs = self.inner.config.active_wait_timeout_secs;
                return match time::timeout(Duration::from_secs(waited_secs), rx).await {
                    Ok(Ok(outcome)) => outcome,
                    // The conversion resolved between attach and drain;
                    // fall back to the job record.
                    Ok(Err(_)) => self.reuse_recent_job(&document_id).await,
                    Err(_) => Err(Error::WaitTimeout {
                        document_id,
                        waited_secs,
                    }),
                };
            }
            Err(tx) => tx,
        };

        // Jobs do not record a document version, so the recent-job shortcut
        // only applies to unversioned requests.
        let window = chrono::Duration::seconds(self.inner.config.recent_job_window_secs as i64);
        if request.document_version.is_none()
            && let Some(job) = self
                .inner
                .jobs
                .find_recent_completed(&document_id, window)
                .await?
            && let Some(result) = job.result_data.clone()
        {
            debug!(
                document_id = %document_id,
                job_id = %job.id,
                "Reusing recently completed conversion"
            );
            if let Err(e) = self
                .inner
                .cache
                .set(&document_id, result.clone(), None, None)
                .await
            {
                warn!(document_id = %document_id, "Failed to re-cache recent result: {}", e);
            }
            return Ok(ConversionOutcome {
                job_id: Some(job.id),
                document_id,
                result,
                from_cache: false,
            });
        }

        if self.inner.pending.enqueue_or_attach(request, tx) {
            self.check_queue_depth();
        }
        self.await_outcome(rx, &document_id).await
    }

    /// Cancel the conversion for a document. Returns false when nothing is
    /// pending or in flight.
    ///
    /// Active conversions are cancelled cooperatively through the job's
    /// cancellation token; the running task records the cancelled status.
    pub async fn cancel_conversion(&self, document_id: &str) -> Result<bool> {
        if let Some(item) = self.inner.pending.remove_by_document(document_id) {
            info!(document_id = %document_id, "Cancelled pending conversion");
            reject_waiters(item.waiters, || Error::cancelled(document_id.to_string()));
            return Ok(true);
        }

        if let Some(entry) = self.inner.active.get(document_id) {
            info!(document_id = %document_id, job_id = %entry.job_id, "Cancelling active conversion");
            entry.token.cancel();
            return Ok(true);
        }

        Ok(false)
    }

    /// Status for a document: the active job, the pending queue entry, or
    /// the most recent job on record.
    pub async fn get_conversion_status(
        &self,
        document_id: &str,
    ) -> Result<Option<ConversionStatus>> {
        let active_job_id = self.inner.active.get(document_id).map(|e| e.job_id.clone());
        if let Some(job_id) = active_job_id {
            let job = self.inner.jobs.get_job(&job_id).await?;
            return Ok(Some(ConversionStatus::Job(JobProgress::from(&job))));
        }

        if let Some(queued_at) = self.inner.pending.queued_at(document_id) {
            return Ok(Some(ConversionStatus::Pending {
                document_id: document_id.to_string(),
                queued_at,
            }));
        }

        Ok(self
            .inner
            .jobs
            .get_progress(document_id)
            .await?
            .map(ConversionStatus::Job))
    }

    /// Convert a set of documents as one tracked batch.
    ///
    /// Documents run in chunks bounded by the batch's (clamped) concurrency
    /// cap; per-document failures do not fail the batch. The returned result
    /// reports successes and failures side by side.
    pub async fn convert_batch(&self, request: BatchRequest) -> Result<BatchConversionResult> {
        if request.document_ids.is_empty() {
            return Err(Error::validation("batch contains no documents"));
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        let total = request.document_ids.len();
        self.inner.batches.register(&batch_id, total);
        info!(
            batch_id = %batch_id,
            total = total,
            priority = %request.priority.as_str(),
            "Starting batch conversion"
        );

        let chunk_size = request
            .max_concurrent
            .unwrap_or(self.inner.config.max_concurrent_jobs)
            .min(self.inner.config.max_concurrent_jobs)
            .max(1);

        let mut remaining = request.document_ids.as_slice();
        while !remaining.is_empty() {
            if self.inner.batches.is_cancelled(&batch_id) {
                for document_id in remaining {
                    self.inner
                        .batches
                        .record_failure(&batch_id, document_id, "Batch cancelled");
                }
                break;
            }

            let take = chunk_size.min(remaining.len());
            let (chunk, rest) = remaining.split_at(take);
            remaining = rest;
            self.inner.batches.mark_dispatched(&batch_id, chunk.len());

            let tasks = chunk.iter().map(|document_id| {
                let manager = self.clone();
                let batch_id = batch_id.clone();
                let mut conversion =
                    ConversionRequest::new(document_id.clone()).with_priority(request.priority);
                if let Some(member_id) = &request.member_id {
                    conversion = conversion.with_member_id(member_id.clone());
                }
                async move {
                    let document_id = conversion.document_id.clone();
                    if manager.inner.batches.is_cancelled(&batch_id) {
                        manager
                            .inner
                            .batches
                            .record_failure(&batch_id, &document_id, "Batch cancelled");
                    } else {
                        match manager.queue_conversion(conversion).await {
                            Ok(_) => {
                                manager.inner.batches.record_success(&batch_id, &document_id);
                            }
                            Err(e) => {
                                manager.inner.batches.record_failure(
                                    &batch_id,
                                    &document_id,
                                    e.to_string(),
                                );
                            }
                        }
                    }
                    if let Some(progress) = manager.inner.batches.progress(&batch_id) {
                        manager.inner.jobs.broadcaster().batch_updated(&progress).await;
                    }
                }
            });
            join_all(tasks).await;
        }

        let result = self
            .inner
            .batches
            .finalize(&batch_id)
            .ok_or_else(|| Error::Other(format!("batch {batch_id} state lost")))?;
        info!(
            batch_id = %batch_id,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "Batch conversion finished"
        );
        Ok(result)
    }

    /// Progress of a running batch.
    pub fn get_batch_progress(&self, batch_id: &str) -> Option<BatchProgress> {
        self.inner.batches.progress(batch_id)
    }

    /// Final result of a finished batch.
    pub fn get_batch_result(&self, batch_id: &str) -> Option<BatchConversionResult> {
        self.inner.batches.result(batch_id)
    }

    /// Request cancellation of a running batch. Documents not yet dispatched
    /// are skipped; in-flight documents run to completion.
    pub fn cancel_batch(&self, batch_id: &str) -> bool {
        let cancelled = self.inner.batches.cancel(batch_id);
        if cancelled {
            info!(batch_id = %batch_id, "Batch cancellation requested");
        }
        cancelled
    }

    /// Queue and workload statistics.
    pub async fn get_queue_stats(&self) -> Result<QueueStats> {
        let snapshot = self.inner.pending.snapshot(Utc::now());
        let metrics = self.inner.jobs.get_metrics().await?;

        let estimated_wait_secs = if snapshot.total > 0 && metrics.average_processing_secs > 0.0 {
            snapshot.total as f64 * metrics.average_processing_secs
                / self.inner.config.max_concurrent_jobs.max(1) as f64
        } else {
            0.0
        };

        Ok(QueueStats {
            pending: snapshot.total,
            counts: snapshot.counts,
            active_jobs: self.inner.active.len(),
            running_batches: self.inner.batches.running_count(),
            average_wait_secs: snapshot.average_wait_secs,
            estimated_wait_secs,
            depth: QueueDepthStatus::classify(snapshot.total, &self.inner.config),
        })
    }

    /// Warm the cache for explicit documents, or for recently active ones
    /// when none are given. Conversions run in the background at low
    /// priority; returns the number of conversions kicked off.
    pub async fn warm_cache(&self, document_ids: Option<&[String]>) -> Result<usize> {
        let candidates = self.inner.cache.warm_candidates(document_ids).await?;
        let count = candidates.len();
        for document_id in candidates {
            let manager = self.clone();
            tokio::spawn(async move {
                let request =
                    ConversionRequest::new(document_id.clone()).with_priority(JobPriority::Low);
                if let Err(e) = manager.queue_conversion(request).await {
                    debug!(document_id = %document_id, "Cache warm conversion failed: {}", e);
                }
            });
        }
        if count > 0 {
            info!("Warming cache for {} documents", count);
        }
        Ok(count)
    }

    pub async fn get_progress(&self, document_id: &str) -> Result<Option<JobProgress>> {
        self.inner.jobs.get_progress(document_id).await
    }

    pub async fn get_metrics(&self) -> Result<JobMetrics> {
        self.inner.jobs.get_metrics().await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.get_stats()
    }

    pub async fn invalidate_cache(&self, document_id: &str) -> Result<bool> {
        self.inner.cache.invalidate(document_id).await
    }

    pub async fn invalidate_cache_multiple(&self, document_ids: &[String]) -> Result<u64> {
        self.inner.cache.invalidate_multiple(document_ids).await
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.inner.cache.clear().await
    }

    /// Sweep expired cache entries now, outside the maintenance schedule.
    pub async fn cleanup_expired_cache(&self) -> Result<u64> {
        self.inner.cache.cleanup_expired().await
    }

    /// Stop the dispatch loop, cancel active conversions, and reject every
    /// pending waiter.
    pub async fn shutdown(&self) {
        info!("Conversion manager shutting down");
        self.inner.shutdown_token.cancel();

        let handle = self.inner.dispatch_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        // Active tokens are children of the shutdown token and are already
        // cancelled; their tasks resolve the attached waiters.
        for item in self.inner.pending.drain() {
            let document_id = item.request.document_id.clone();
            reject_waiters(item.waiters, || Error::cancelled(document_id.clone()));
        }
    }

    async fn dispatch_tick(&self) {
        loop {
            if self.inner.active.len() >= self.inner.config.max_concurrent_jobs {
                break;
            }
            let Some(mut item) = self.inner.pending.pop_next(Utc::now()) else {
                break;
            };
            let document_id = item.request.document_id.clone();

            // A conversion for this document started since the item was
            // enqueued; merge the waiters instead of double-dispatching.
            if let Some(entry) = self.inner.active.get(&document_id) {
                entry.waiters.lock().append(&mut item.waiters);
                continue;
            }

            let job = match self
                .inner
                .jobs
                .create_job(
                    &document_id,
                    item.request.priority,
                    item.request.member_id.as_deref(),
                )
                .await
            {
                Ok(job) => job,
                Err(e) => {
                    error!(document_id = %document_id, "Failed to create job: {}", e);
                    let message = format!("failed to create job: {e}");
                    reject_waiters(item.waiters, || {
                        Error::conversion_failed(document_id.clone(), message.clone())
                    });
                    continue;
                }
            };

            let token = self.inner.shutdown_token.child_token();
            self.inner.active.insert(
                document_id.clone(),
                ActiveConversion {
                    job_id: job.id.clone(),
                    token: token.clone(),
                    waiters: Mutex::new(Vec::new()),
                },
            );
            debug!(document_id = %document_id, job_id = %job.id, "Dispatching conversion");

            let manager = self.clone();
            tokio::spawn(async move {
                manager.run_conversion(item, job, token).await;
            });
        }
    }

    async fn run_conversion(&self, item: QueueItem, job: ConversionJob, token: CancellationToken) {
        match self.execute_stages(&job, &token).await {
            Ok(result) => self.handle_success(item, &job, result).await,
            Err(_) if token.is_cancelled() => self.handle_cancelled(item, &job).await,
            Err(e) => self.handle_failure(item, &job, &e.to_string()).await,
        }
    }

    async fn execute_stages(
        &self,
        job: &ConversionJob,
        token: &CancellationToken,
    ) -> Result<serde_json::Value> {
        self.inner
            .jobs
            .update_job(
                &job.id,
                JobUpdate::new()
                    .with_status(JobStatus::Processing)
                    .with_stage(JobStage::Initializing),
            )
            .await?;
        self.inner
            .jobs
            .update_job(&job.id, JobUpdate::new().with_stage(JobStage::ProcessingPages))
            .await?;

        let result = tokio::select! {
            _ = token.cancelled() => return Err(Error::cancelled(job.document_id.clone())),
            result = self.inner.worker.convert(job) => result?,
        };

        self.inner
            .jobs
            .update_job(&job.id, JobUpdate::new().with_stage(JobStage::UploadingPages))
            .await?;
        Ok(result)
    }

    async fn handle_success(&self, item: QueueItem, job: &ConversionJob, result: serde_json::Value) {
        let document_id = item.request.document_id.clone();

        // Cache population is best-effort; the conversion itself stands.
        if let Err(e) = self
            .inner
            .cache
            .set(
                &document_id,
                result.clone(),
                item.request.document_version.clone(),
                None,
            )
            .await
        {
            warn!(document_id = %document_id, "Failed to cache conversion result: {}", e);
        }

        match self
            .inner
            .jobs
            .update_job(
                &job.id,
                JobUpdate::new()
                    .with_status(JobStatus::Completed)
                    .with_stage(JobStage::Completed)
                    .with_result_data(result.clone()),
            )
            .await
        {
            Ok(_) => {
                let waiters = self.take_waiters(&document_id, item.waiters);
                info!(
                    document_id = %document_id,
                    job_id = %job.id,
                    waiters = waiters.len(),
                    "Conversion completed"
                );
                resolve_waiters(
                    waiters,
                    &ConversionOutcome {
                        job_id: Some(job.id.clone()),
                        document_id,
                        result,
                        from_cache: false,
                    },
                );
            }
            Err(e) => {
                self.handle_failure(item, job, &format!("failed to persist completion: {e}"))
                    .await;
            }
        }
    }

    async fn handle_cancelled(&self, item: QueueItem, job: &ConversionJob) {
        let document_id = item.request.document_id.clone();
        if let Err(e) = self
            .inner
            .jobs
            .update_job(
                &job.id,
                JobUpdate::new()
                    .with_status(JobStatus::Cancelled)
                    .with_error_message("Conversion cancelled"),
            )
            .await
        {
            error!(job_id = %job.id, "Failed to record cancellation: {}", e);
        }

        info!(document_id = %document_id, job_id = %job.id, "Conversion cancelled");
        let waiters = self.take_waiters(&document_id, item.waiters);
        reject_waiters(waiters, || Error::cancelled(document_id.clone()));
    }

    async fn handle_failure(&self, item: QueueItem, job: &ConversionJob, message: &str) {
        let document_id = item.request.document_id.clone();

        let updated = match self.inner.jobs.mark_job_failed(&job.id, message, true).await {
            Ok(updated) => updated,
            Err(e) => {
                error!(job_id = %job.id, "Failed to record job failure: {}", e);
                let waiters = self.take_waiters(&document_id, item.waiters);
                let message = message.to_string();
                reject_waiters(waiters, || {
                    Error::conversion_failed(document_id.clone(), message.clone())
                });
                return;
            }
        };

        if updated.status == JobStatus::Queued {
            if item.retry_count < self.inner.config.max_queue_retries {
                let mut waiters = item.waiters;
                if let Some((_, entry)) = self.inner.active.remove(&document_id) {
                    waiters.append(&mut entry.waiters.lock());
                }
                warn!(
                    document_id = %document_id,
                    job_id = %job.id,
                    retry = item.retry_count + 1,
                    "Conversion failed, re-enqueued with backoff"
                );
                self.inner.pending.push(QueueItem {
                    request_id: item.request_id,
                    request: item.request,
                    queued_at: Utc::now(),
                    retry_count: item.retry_count + 1,
                    not_before: updated.estimated_completion,
                    waiters,
                });
                return;
            }

            // Queue retry budget exhausted; settle the job terminally too.
            if let Err(e) = self.inner.jobs.mark_job_failed(&job.id, message, false).await {
                error!(job_id = %job.id, "Failed to finalize job failure: {}", e);
            }
        }

        warn!(
            document_id = %document_id,
            job_id = %job.id,
            "Conversion failed terminally: {}",
            message
        );
        let waiters = self.take_waiters(&document_id, item.waiters);
        let message = updated
            .error_message
            .clone()
            .unwrap_or_else(|| message.to_string());
        reject_waiters(waiters, || {
            Error::conversion_failed(document_id.clone(), message.clone())
        });
    }

    /// Remove the active record and merge its waiters with the item's.
    fn take_waiters(&self, document_id: &str, mut waiters: Vec<Waiter>) -> Vec<Waiter> {
        if let Some((_, entry)) = self.inner.active.remove(document_id) {
            waiters.append(&mut entry.waiters.lock());
        }
        waiters
    }

    fn attach_active_waiter(
        &self,
        document_id: &str,
        waiter: Waiter,
    ) -> std::result::Result<(), Waiter> {
        match self.inner.active.get(document_id) {
            Some(entry) => {
                entry.waiters.lock().push(waiter);
                Ok(())
            }
            None => Err(waiter),
        }
    }

    async fn await_outcome(
        &self,
        rx: oneshot::Receiver<Result<ConversionOutcome>>,
        document_id: &str,
    ) -> Result<ConversionOutcome> {
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::cancelled(document_id.to_string())),
        }
    }

    async fn reuse_recent_job(&self, document_id: &str) -> Result<ConversionOutcome> {
        let window = chrono::Duration::seconds(self.inner.config.recent_job_window_secs as i64);
        if let Some(job) = self
            .inner
            .jobs
            .find_recent_completed(document_id, window)
            .await?
            && let Some(result) = job.result_data.clone()
        {
            return Ok(ConversionOutcome {
                job_id: Some(job.id),
                document_id: document_id.to_string(),
                result,
                from_cache: false,
            });
        }
        // The in-flight conversion resolved but left nothing retrievable;
        // this is a lost result, not a cancellation.
        Err(Error::conversion_failed(
            document_id,
            "conversion resolved without a retrievable result",
        ))
    }

    fn check_queue_depth(&self) {
        let depth = self.inner.pending.len();
        if depth >= self.inner.config.critical_threshold {
            error!("Conversion queue depth critical: {} pending", depth);
        } else if depth >= self.inner.config.warning_threshold {
            warn!("Conversion queue depth elevated: {} pending", depth);
        }
    }
}
