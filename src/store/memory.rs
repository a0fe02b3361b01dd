//! In-memory store implementations.
//!
//! Used by tests and by embedders that do not need durability. Both stores
//! implement the same contracts as the SQLite-backed ones.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::Result;
use crate::cache::CachedResult;
use crate::job::{ConversionJob, JobStage, JobStatus};
use crate::store::job::{JobStore, JobTimings};
use crate::store::cache::CacheStore;

/// In-memory implementation of [`JobStore`].
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, ConversionJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &ConversionJob) -> Result<()> {
        self.jobs.lock().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<ConversionJob>> {
        Ok(self.jobs.lock().get(id).cloned())
    }

    async fn find_active_by_document(&self, document_id: &str) -> Result<Option<ConversionJob>> {
        let jobs = self.jobs.lock();
        Ok(jobs
            .values()
            .filter(|j| j.document_id == document_id && j.status.is_active())
            .max_by_key(|j| j.created_at)
            .cloned())
    }

    async fn find_latest_by_document(&self, document_id: &str) -> Result<Option<ConversionJob>> {
        let jobs = self.jobs.lock();
        Ok(jobs
            .values()
            .filter(|j| j.document_id == document_id)
            .max_by_key(|j| j.created_at)
            .cloned())
    }

    async fn update_job(&self, job: &ConversionJob) -> Result<()> {
        self.jobs.lock().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn next_queued_job(&self, now: DateTime<Utc>) -> Result<Option<ConversionJob>> {
        let jobs = self.jobs.lock();
        Ok(jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Queued
                    && j.estimated_completion.is_none_or(|gate| gate <= now)
            })
            .min_by_key(|j| (std::cmp::Reverse(j.priority.rank()), j.created_at))
            .cloned())
    }

    async fn reset_processing_jobs(&self) -> Result<u64> {
        let mut jobs = self.jobs.lock();
        let mut reset = 0u64;
        for job in jobs.values_mut() {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Queued;
                job.stage = JobStage::Queued;
                job.progress = 0;
                job.updated_at = Utc::now();
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, j| !(j.status.is_terminal() && j.updated_at < cutoff));
        Ok((before - jobs.len()) as u64)
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<u64> {
        let jobs = self.jobs.lock();
        Ok(jobs.values().filter(|j| j.status == status).count() as u64)
    }

    async fn aggregate_timings(&self, since: DateTime<Utc>) -> Result<JobTimings> {
        let jobs = self.jobs.lock();
        let mut timings = JobTimings::default();
        let mut total_secs = 0.0;
        let mut timed = 0u64;

        for job in jobs.values() {
            let Some(completed_at) = job.completed_at else {
                continue;
            };
            if completed_at < since {
                continue;
            }
            match job.status {
                JobStatus::Completed => {
                    timings.completed += 1;
                    if let Some(started_at) = job.started_at {
                        total_secs += (completed_at - started_at).num_milliseconds() as f64
                            / 1000.0;
                        timed += 1;
                    }
                }
                JobStatus::Failed => timings.failed += 1,
                _ => {}
            }
        }

        if timed > 0 {
            timings.average_processing_secs = total_secs / timed as f64;
        }
        Ok(timings)
    }

    async fn recently_completed_documents(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>> {
        let jobs = self.jobs.lock();
        let mut latest: HashMap<String, DateTime<Utc>> = HashMap::new();
        for job in jobs.values() {
            if job.status != JobStatus::Completed {
                continue;
            }
            let Some(completed_at) = job.completed_at else {
                continue;
            };
            if completed_at < since {
                continue;
            }
            let entry = latest.entry(job.document_id.clone()).or_insert(completed_at);
            if completed_at > *entry {
                *entry = completed_at;
            }
        }

        let mut documents: Vec<(String, DateTime<Utc>)> = latest.into_iter().collect();
        documents.sort_by(|a, b| b.1.cmp(&a.1));
        documents.truncate(limit);
        Ok(documents.into_iter().map(|(id, _)| id).collect())
    }
}

/// In-memory implementation of [`CacheStore`].
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CachedResult>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries (expired or not). Test helper.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn upsert_by_document(&self, entry: &CachedResult) -> Result<()> {
        self.entries
            .lock()
            .insert(entry.document_id.clone(), entry.clone());
        Ok(())
    }

    async fn find_unexpired(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<CachedResult>> {
        let entries = self.entries.lock();
        let mut unexpired: Vec<CachedResult> = entries
            .values()
            .filter(|e| e.expires_at > now)
            .cloned()
            .collect();
        unexpired.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        unexpired.truncate(limit);
        Ok(unexpired)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(document_id).is_some())
    }

    async fn delete_many(&self, document_ids: &[String]) -> Result<u64> {
        let mut entries = self.entries.lock();
        let mut deleted = 0u64;
        for document_id in document_ids {
            if entries.remove(document_id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        Ok((before - entries.len()) as u64)
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut entries = self.entries.lock();
        let count = entries.len() as u64;
        entries.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobPriority;

    #[tokio::test]
    async fn test_active_job_lookup() {
        let store = MemoryJobStore::new();
        let job = ConversionJob::new("doc-1", JobPriority::Normal);
        store.create_job(&job).await.unwrap();

        let active = store.find_active_by_document("doc-1").await.unwrap();
        assert_eq!(active.unwrap().id, job.id);

        let mut done = job.clone();
        done.status = JobStatus::Completed;
        store.update_job(&done).await.unwrap();
        assert!(
            store
                .find_active_by_document("doc-1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_next_queued_priority_then_fifo() {
        let store = MemoryJobStore::new();
        let mut low = ConversionJob::new("doc-low", JobPriority::Low);
        let mut high = ConversionJob::new("doc-high", JobPriority::High);
        let mut normal = ConversionJob::new("doc-normal", JobPriority::Normal);
        // Distinct creation times so FIFO is well defined.
        low.created_at = Utc::now() - chrono::Duration::seconds(30);
        high.created_at = Utc::now() - chrono::Duration::seconds(20);
        normal.created_at = Utc::now() - chrono::Duration::seconds(10);

        store.create_job(&low).await.unwrap();
        store.create_job(&high).await.unwrap();
        store.create_job(&normal).await.unwrap();

        let next = store.next_queued_job(Utc::now()).await.unwrap().unwrap();
        assert_eq!(next.document_id, "doc-high");
    }

    #[tokio::test]
    async fn test_backoff_gate_skips_job() {
        let store = MemoryJobStore::new();
        let mut gated = ConversionJob::new("doc-gated", JobPriority::Urgent);
        gated.estimated_completion = Some(Utc::now() + chrono::Duration::seconds(60));
        let open = ConversionJob::new("doc-open", JobPriority::Low);

        store.create_job(&gated).await.unwrap();
        store.create_job(&open).await.unwrap();

        let next = store.next_queued_job(Utc::now()).await.unwrap().unwrap();
        assert_eq!(next.document_id, "doc-open");
    }
}
