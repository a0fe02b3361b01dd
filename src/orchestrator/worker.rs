//! Conversion worker seam.

use async_trait::async_trait;

use crate::Result;
use crate::job::ConversionJob;

/// Performs the actual document conversion.
///
/// The orchestrator owns queueing, dedup, retries, and caching; the worker
/// only turns a job into a result payload. Implementations are expected to
/// be cancellation-safe: the orchestrator drops the convert future when a
/// conversion is cancelled.
#[async_trait]
pub trait ConversionWorker: Send + Sync {
    async fn convert(&self, job: &ConversionJob) -> Result<serde_json::Value>;
}
