//! Document conversion orchestration core.
//!
//! docpress coordinates document conversions end to end: a durable job state
//! machine ([`job::JobManager`]), a bounded TTL'd result cache
//! ([`cache::ResultCache`]), and a centralized orchestrator
//! ([`orchestrator::ConversionManager`]) that deduplicates requests per
//! document, dispatches by priority under a concurrency cap, retries with
//! exponential backoff, and fans results out to every waiting caller.
//!
//! The actual conversion is behind the [`orchestrator::ConversionWorker`]
//! trait; this crate supplies everything around it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use docpress::{ConversionCore, ConversionRequest, CoreConfig};
//! # use docpress::{ConversionJob, ConversionWorker, Result};
//! # struct MyWorker;
//! # #[async_trait::async_trait]
//! # impl ConversionWorker for MyWorker {
//! #     async fn convert(&self, _job: &ConversionJob) -> Result<serde_json::Value> {
//! #         Ok(serde_json::json!({}))
//! #     }
//! # }
//!
//! # async fn run() -> docpress::Result<()> {
//! let core = ConversionCore::open_sqlite(
//!     "sqlite:docpress.db?mode=rwc",
//!     CoreConfig::default(),
//!     Arc::new(MyWorker),
//! )
//! .await?;
//! core.start().await?;
//!
//! let outcome = core
//!     .manager()
//!     .queue_conversion(ConversionRequest::new("doc-1"))
//!     .await?;
//! println!("converted: {}", outcome.result);
//!
//! core.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod store;

pub use cache::{CacheStats, CachedResult, ResultCache};
pub use config::{CacheConfig, CoreConfig, MaintenanceConfig, ManagerConfig, RetryConfig};
pub use error::{Error, Result};
pub use job::{
    ConversionJob, JobManager, JobMetrics, JobPriority, JobProgress, JobStage, JobStatus,
    JobUpdate, MaintenanceService, NoopProgressBroadcaster, ProgressBroadcaster,
};
pub use orchestrator::{
    BatchConversionResult, BatchProgress, BatchRequest, ConversionManager, ConversionOutcome,
    ConversionRequest, ConversionStatus, ConversionWorker, QueueDepthStatus, QueueStats,
};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use store::{CacheStore, JobStore, MemoryCacheStore, MemoryJobStore, SqlxCacheStore, SqlxJobStore};

/// Fully wired conversion core: manager, job state machine, result cache,
/// and background maintenance.
pub struct ConversionCore {
    jobs: Arc<JobManager>,
    cache: Arc<ResultCache>,
    manager: ConversionManager,
    maintenance: Arc<MaintenanceService>,
    background_token: CancellationToken,
}

impl ConversionCore {
    /// Wire the core on top of explicit stores and collaborators.
    pub fn from_parts(
        config: CoreConfig,
        job_store: Arc<dyn JobStore>,
        cache_store: Arc<dyn CacheStore>,
        worker: Arc<dyn ConversionWorker>,
        broadcaster: Arc<dyn ProgressBroadcaster>,
    ) -> Self {
        let jobs = Arc::new(JobManager::new(
            job_store.clone(),
            config.retry.clone(),
            broadcaster,
        ));
        let cache = Arc::new(ResultCache::new(
            config.cache.clone(),
            cache_store,
            job_store,
        ));
        let manager = ConversionManager::new(
            config.manager.clone(),
            jobs.clone(),
            cache.clone(),
            worker,
        );
        let maintenance = Arc::new(MaintenanceService::new(
            config.maintenance.clone(),
            jobs.clone(),
            cache.clone(),
        ));

        Self {
            jobs,
            cache,
            manager,
            maintenance,
            background_token: CancellationToken::new(),
        }
    }

    /// Open (and migrate) a SQLite-backed core.
    pub async fn open_sqlite(
        database_url: &str,
        config: CoreConfig,
        worker: Arc<dyn ConversionWorker>,
    ) -> Result<Self> {
        let pool = store::init_pool(database_url).await?;
        store::init_schema(&pool).await?;
        Ok(Self::from_parts(
            config,
            Arc::new(SqlxJobStore::new(pool.clone())),
            Arc::new(SqlxCacheStore::new(pool)),
            worker,
            Arc::new(NoopProgressBroadcaster),
        ))
    }

    /// Non-durable core backed by in-memory stores.
    pub fn in_memory(config: CoreConfig, worker: Arc<dyn ConversionWorker>) -> Self {
        Self::from_parts(
            config,
            Arc::new(MemoryJobStore::new()),
            Arc::new(MemoryCacheStore::new()),
            worker,
            Arc::new(NoopProgressBroadcaster),
        )
    }

    /// Start the dispatch loop and the maintenance task.
    pub async fn start(&self) -> Result<()> {
        self.manager.start().await?;
        self.maintenance
            .clone()
            .start_background_task(self.background_token.child_token());
        Ok(())
    }

    /// Stop background tasks and settle every outstanding waiter.
    pub async fn shutdown(&self) {
        self.background_token.cancel();
        self.manager.shutdown().await;
    }

    pub fn manager(&self) -> &ConversionManager {
        &self.manager
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn maintenance(&self) -> &Arc<MaintenanceService> {
        &self.maintenance
    }
}
