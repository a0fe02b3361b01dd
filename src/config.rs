//! Configuration for the conversion orchestration core.
//!
//! All sections deserialize with per-field defaults so a partial config file
//! (or an empty one) always yields a usable configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the conversion manager's dispatch loop and queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum number of conversions processed concurrently.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Interval between dispatch ticks in milliseconds.
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,

    /// Hard timeout when waiting for an already-active conversion, in seconds.
    #[serde(default = "default_active_wait_timeout_secs")]
    pub active_wait_timeout_secs: u64,

    /// Freshness window for reusing a recently completed job, in seconds.
    #[serde(default = "default_recent_job_window_secs")]
    pub recent_job_window_secs: u64,

    /// Maximum number of queue-level re-enqueues for a failing conversion.
    #[serde(default = "default_max_queue_retries")]
    pub max_queue_retries: u32,

    /// Warning threshold for queue depth.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: usize,

    /// Critical threshold for queue depth.
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: usize,
}

fn default_max_concurrent_jobs() -> usize {
    3
}

fn default_dispatch_interval_ms() -> u64 {
    500
}

fn default_active_wait_timeout_secs() -> u64 {
    60
}

fn default_recent_job_window_secs() -> u64 {
    300
}

fn default_max_queue_retries() -> u32 {
    3
}

fn default_warning_threshold() -> usize {
    100
}

fn default_critical_threshold() -> usize {
    500
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            dispatch_interval_ms: default_dispatch_interval_ms(),
            active_wait_timeout_secs: default_active_wait_timeout_secs(),
            recent_job_window_secs: default_recent_job_window_secs(),
            max_queue_retries: default_max_queue_retries(),
            warning_threshold: default_warning_threshold(),
            critical_threshold: default_critical_threshold(),
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_dispatch_interval_ms(mut self, ms: u64) -> Self {
        self.dispatch_interval_ms = ms;
        self
    }

    pub fn with_active_wait_timeout_secs(mut self, secs: u64) -> Self {
        self.active_wait_timeout_secs = secs;
        self
    }

    pub fn with_recent_job_window_secs(mut self, secs: u64) -> Self {
        self.recent_job_window_secs = secs;
        self
    }

    pub fn with_max_queue_retries(mut self, retries: u32) -> Self {
        self.max_queue_retries = retries;
        self
    }
}

/// Retry and backoff configuration for job-level failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts before a job becomes terminally failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in seconds.
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,

    /// Multiplier applied per retry attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Hard cap on the backoff delay in seconds.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_secs() -> u64 {
    10
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_secs() -> u64 {
    300
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_secs: default_initial_delay_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_initial_delay_secs(mut self, secs: u64) -> Self {
        self.initial_delay_secs = secs;
        self
    }

    pub fn with_max_delay_secs(mut self, secs: u64) -> Self {
        self.max_delay_secs = secs;
        self
    }
}

/// Configuration for the result cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached entries before LRU eviction kicks in.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Default TTL for cache entries in seconds.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Maximum number of documents warmed in one batch.
    #[serde(default = "default_warm_batch_size")]
    pub warm_batch_size: usize,

    /// Number of top-accessed documents reported in cache stats.
    #[serde(default = "default_top_accessed_limit")]
    pub top_accessed_limit: usize,

    /// Assumed cost of one conversion in seconds, used for the
    /// estimated-time-saved figure in cache stats.
    #[serde(default = "default_assumed_conversion_secs")]
    pub assumed_conversion_secs: u64,
}

fn default_max_entries() -> usize {
    100
}

fn default_ttl_secs() -> u64 {
    86_400 // 24 hours
}

fn default_warm_batch_size() -> usize {
    10
}

fn default_top_accessed_limit() -> usize {
    10
}

fn default_assumed_conversion_secs() -> u64 {
    30
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            default_ttl_secs: default_ttl_secs(),
            warm_batch_size: default_warm_batch_size(),
            top_accessed_limit: default_top_accessed_limit(),
            assumed_conversion_secs: default_assumed_conversion_secs(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn with_default_ttl_secs(mut self, secs: u64) -> Self {
        self.default_ttl_secs = secs;
        self
    }

    pub fn with_warm_batch_size(mut self, size: usize) -> Self {
        self.warm_batch_size = size;
        self
    }
}

/// Configuration for background maintenance (job purge + cache sweep).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Number of days to retain terminal jobs. 0 retains jobs indefinitely.
    #[serde(default = "default_job_retention_days")]
    pub job_retention_days: u32,

    /// Interval between maintenance runs in seconds.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

fn default_job_retention_days() -> u32 {
    7
}

fn default_check_interval_secs() -> u64 {
    3600 // 1 hour
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            job_retention_days: default_job_retention_days(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

impl MaintenanceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job_retention_days(mut self, days: u32) -> Self {
        self.job_retention_days = days;
        self
    }

    pub fn with_check_interval_secs(mut self, secs: u64) -> Self {
        self.check_interval_secs = secs;
        self
    }
}

/// Top-level configuration for the conversion core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}
