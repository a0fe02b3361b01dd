//! Batch conversion bookkeeping.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::job::JobPriority;

/// A request to convert several documents as one tracked batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub document_ids: Vec<String>,
    pub priority: JobPriority,
    pub member_id: Option<String>,
    /// Per-batch concurrency cap; clamped to the manager's global cap.
    pub max_concurrent: Option<usize>,
}

impl BatchRequest {
    pub fn new(document_ids: Vec<String>) -> Self {
        Self {
            document_ids,
            priority: JobPriority::Normal,
            member_id: None,
            max_concurrent: None,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_member_id(mut self, member_id: impl Into<String>) -> Self {
        self.member_id = Some(member_id.into());
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = Some(max);
        self
    }
}

/// Progress snapshot of a running batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub cancelled: bool,
    /// Linear extrapolation from elapsed time over resolved documents.
    pub estimated_remaining_secs: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One failed document within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDocumentFailure {
    pub document_id: String,
    pub error: String,
}

/// Final result of a batch.
///
/// A batch always runs to completion; per-document failures are reported
/// here rather than failing the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConversionResult {
    pub batch_id: String,
    pub total: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchDocumentFailure>,
    pub cancelled: bool,
    pub duration_secs: f64,
    pub finished_at: DateTime<Utc>,
}

struct BatchState {
    total: usize,
    succeeded: Vec<String>,
    failed: Vec<BatchDocumentFailure>,
    in_progress: usize,
    cancelled: bool,
    started_at: DateTime<Utc>,
}

impl BatchState {
    fn resolved(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    fn progress(&self, batch_id: &str) -> BatchProgress {
        let now = Utc::now();
        let resolved = self.resolved();
        let remaining = self.total.saturating_sub(resolved + self.in_progress);

        let estimated_remaining_secs = if resolved > 0 && resolved < self.total {
            let elapsed_secs =
                (now - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
            let per_document = elapsed_secs / resolved as f64;
            Some((per_document * (self.total - resolved) as f64) as u64)
        } else {
            None
        };

        BatchProgress {
            batch_id: batch_id.to_string(),
            total: self.total,
            completed: self.succeeded.len(),
            failed: self.failed.len(),
            in_progress: self.in_progress,
            pending: remaining,
            cancelled: self.cancelled,
            estimated_remaining_secs,
            started_at: self.started_at,
            updated_at: now,
        }
    }
}

/// Tracks running batches and retains finished batch results.
pub(crate) struct BatchTracker {
    running: DashMap<String, BatchState>,
    finished: DashMap<String, BatchConversionResult>,
}

impl BatchTracker {
    pub fn new() -> Self {
        Self {
            running: DashMap::new(),
            finished: DashMap::new(),
        }
    }

    pub fn register(&self, batch_id: &str, total: usize) {
        self.running.insert(
            batch_id.to_string(),
            BatchState {
                total,
                succeeded: Vec::new(),
                failed: Vec::new(),
                in_progress: 0,
                cancelled: false,
                started_at: Utc::now(),
            },
        );
    }

    pub fn mark_dispatched(&self, batch_id: &str, count: usize) {
        if let Some(mut state) = self.running.get_mut(batch_id) {
            state.in_progress += count;
        }
    }

    pub fn record_success(&self, batch_id: &str, document_id: &str) {
        if let Some(mut state) = self.running.get_mut(batch_id) {
            state.in_progress = state.in_progress.saturating_sub(1);
            state.succeeded.push(document_id.to_string());
        }
    }

    pub fn record_failure(&self, batch_id: &str, document_id: &str, error: impl Into<String>) {
        if let Some(mut state) = self.running.get_mut(batch_id) {
            state.in_progress = state.in_progress.saturating_sub(1);
            state.failed.push(BatchDocumentFailure {
                document_id: document_id.to_string(),
                error: error.into(),
            });
        }
    }

    /// Request cancellation of a running batch. Returns false for unknown
    /// or already-finished batches.
    pub fn cancel(&self, batch_id: &str) -> bool {
        match self.running.get_mut(batch_id) {
            Some(mut state) => {
                state.cancelled = true;
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self, batch_id: &str) -> bool {
        self.running
            .get(batch_id)
            .map(|state| state.cancelled)
            .unwrap_or(false)
    }

    pub fn progress(&self, batch_id: &str) -> Option<BatchProgress> {
        self.running.get(batch_id).map(|state| state.progress(batch_id))
    }

    /// Finish a batch: drop the running state and retain the final result.
    pub fn finalize(&self, batch_id: &str) -> Option<BatchConversionResult> {
        let (_, state) = self.running.remove(batch_id)?;
        let now = Utc::now();
        let result = BatchConversionResult {
            batch_id: batch_id.to_string(),
            total: state.total,
            succeeded: state.succeeded,
            failed: state.failed,
            cancelled: state.cancelled,
            duration_secs: (now - state.started_at).num_milliseconds().max(0) as f64 / 1000.0,
            finished_at: now,
        };
        self.finished.insert(batch_id.to_string(), result.clone());
        Some(result)
    }

    pub fn result(&self, batch_id: &str) -> Option<BatchConversionResult> {
        self.finished.get(batch_id).map(|r| r.clone())
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_lifecycle() {
        let tracker = BatchTracker::new();
        tracker.register("batch-1", 3);
        tracker.mark_dispatched("batch-1", 2);

        tracker.record_success("batch-1", "doc-1");
        tracker.record_failure("batch-1", "doc-2", "conversion failed");

        let progress = tracker.progress("batch-1").unwrap();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.in_progress, 0);
        assert_eq!(progress.pending, 1);

        tracker.mark_dispatched("batch-1", 1);
        tracker.record_success("batch-1", "doc-3");

        let result = tracker.finalize("batch-1").unwrap();
        assert_eq!(result.succeeded, vec!["doc-1", "doc-3"]);
        assert_eq!(result.failed.len(), 1);
        assert!(!result.cancelled);

        assert!(tracker.progress("batch-1").is_none());
        assert!(tracker.result("batch-1").is_some());
    }

    #[test]
    fn test_cancel_running_batch() {
        let tracker = BatchTracker::new();
        tracker.register("batch-1", 2);
        assert!(tracker.cancel("batch-1"));
        assert!(tracker.is_cancelled("batch-1"));
        assert!(!tracker.cancel("batch-2"));
    }

    #[test]
    fn test_eta_only_after_first_resolution() {
        let tracker = BatchTracker::new();
        tracker.register("batch-1", 4);
        assert!(
            tracker
                .progress("batch-1")
                .unwrap()
                .estimated_remaining_secs
                .is_none()
        );

        tracker.mark_dispatched("batch-1", 1);
        tracker.record_success("batch-1", "doc-1");
        assert!(
            tracker
                .progress("batch-1")
                .unwrap()
                .estimated_remaining_secs
                .is_some()
        );
    }
}
