//! Background maintenance: old-job purge and expired-cache sweep.

use std::sync::Arc;

use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::Result;
use crate::cache::ResultCache;
use crate::config::MaintenanceConfig;
use crate::job::JobManager;

/// Periodically purges terminal jobs past their retention and sweeps expired
/// cache entries.
pub struct MaintenanceService {
    config: MaintenanceConfig,
    jobs: Arc<JobManager>,
    cache: Arc<ResultCache>,
}

impl MaintenanceService {
    pub fn new(config: MaintenanceConfig, jobs: Arc<JobManager>, cache: Arc<ResultCache>) -> Self {
        Self {
            config,
            jobs,
            cache,
        }
    }

    /// Run one maintenance pass. Returns (purged jobs, swept cache entries).
    pub async fn run_once(&self) -> Result<(u64, u64)> {
        let purged = if self.config.job_retention_days > 0 {
            self.jobs
                .cleanup_old_jobs(self.config.job_retention_days)
                .await?
        } else {
            debug!("Job purging disabled (job_retention_days = 0)");
            0
        };

        let swept = self.cache.cleanup_expired().await?;
        Ok((purged, swept))
    }

    /// Start the background maintenance task.
    pub fn start_background_task(self: Arc<Self>, cancellation_token: CancellationToken) {
        let check_interval_secs = self.config.check_interval_secs;
        tokio::spawn(async move {
            let mut check_interval = interval(Duration::from_secs(check_interval_secs));

            info!(
                "Maintenance service started (retention: {} days, interval: {}s)",
                self.config.job_retention_days, check_interval_secs
            );

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        info!("Maintenance service shutting down");
                        break;
                    }
                    _ = check_interval.tick() => {
                        match self.run_once().await {
                            Ok((purged, swept)) => {
                                if purged > 0 || swept > 0 {
                                    debug!(
                                        "Maintenance cycle: {} jobs purged, {} cache entries swept",
                                        purged, swept
                                    );
                                }
                            }
                            Err(e) => {
                                error!("Maintenance cycle failed: {}", e);
                            }
                        }
                    }
                }
            }
        });
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::config::{CacheConfig, RetryConfig};
    use crate::job::{ConversionJob, JobPriority, JobStatus, NoopProgressBroadcaster};
    use crate::store::{JobStore, MemoryCacheStore, MemoryJobStore};

    fn service(retention_days: u32) -> (MaintenanceService, Arc<MemoryJobStore>) {
        let job_store = Arc::new(MemoryJobStore::new());
        let jobs = Arc::new(JobManager::new(
            job_store.clone(),
            RetryConfig::default(),
            Arc::new(NoopProgressBroadcaster),
        ));
        let cache = Arc::new(ResultCache::new(
            CacheConfig::default(),
            Arc::new(MemoryCacheStore::new()),
            job_store.clone(),
        ));
        let config = MaintenanceConfig::new().with_job_retention_days(retention_days);
        (MaintenanceService::new(config, jobs, cache), job_store)
    }

    /// One terminal job past retention and one cache entry past its TTL.
    async fn seed(service: &MaintenanceService, store: &Arc<MemoryJobStore>) -> String {
        let mut job = ConversionJob::new("doc-old", JobPriority::Normal);
        job.status = JobStatus::Completed;
        job.updated_at = Utc::now() - chrono::Duration::days(10);
        job.completed_at = Some(job.updated_at);
        store.create_job(&job).await.unwrap();

        service
            .cache
            .set(
                "doc-stale",
                serde_json::json!({"pages": 1}),
                None,
                Some(chrono::Duration::seconds(-1)),
            )
            .await
            .unwrap();
        job.id
    }

    #[tokio::test]
    async fn test_run_once_purges_jobs_and_sweeps_cache() {
        let (service, store) = service(7);
        let job_id = seed(&service, &store).await;

        let (purged, swept) = service.run_once().await.unwrap();
        assert_eq!((purged, swept), (1, 1));
        assert!(store.get_job(&job_id).await.unwrap().is_none());
        assert!(!service.cache.contains("doc-stale"));
    }

    #[tokio::test]
    async fn test_retention_zero_disables_job_purge() {
        let (service, store) = service(0);
        let job_id = seed(&service, &store).await;

        let (purged, swept) = service.run_once().await.unwrap();
        assert_eq!(purged, 0);
        assert_eq!(swept, 1);
        assert!(store.get_job(&job_id).await.unwrap().is_some());
    }
}
