//! In-memory pending queue and the waiter fan-out primitive.
//!
//! Every caller interested in a conversion holds one oneshot receiver; the
//! matching senders ride on the queue item (or the active record) until the
//! conversion resolves, at which point all of them are resolved together.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::job::JobPriority;
use crate::{Error, Result};

/// A request to convert one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub document_id: String,
    pub member_id: Option<String>,
    pub priority: JobPriority,
    /// Version token checked against the cache; `None` accepts any version.
    pub document_version: Option<String>,
    /// Opaque caller metadata, carried through untouched.
    pub metadata: Option<serde_json::Value>,
}

impl ConversionRequest {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            member_id: None,
            priority: JobPriority::Normal,
            document_version: None,
            metadata: None,
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

    pub fn with_document_version(mut self, version: impl Into<String>) -> Self {
        self.document_version = Some(version.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// The resolved outcome of a conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutcome {
    /// Job that produced the result; `None` when served straight from cache.
    pub job_id: Option<String>,
    pub document_id: String,
    pub result: serde_json::Value,
    pub from_cache: bool,
}

/// One caller waiting on a conversion.
pub type Waiter = oneshot::Sender<Result<ConversionOutcome>>;

/// Resolve every waiter with a clone of the outcome. Dropped receivers are
/// ignored.
pub(crate) fn resolve_waiters(waiters: Vec<Waiter>, outcome: &ConversionOutcome) {
    for waiter in waiters {
        let _ = waiter.send(Ok(outcome.clone()));
    }
}

/// Reject every waiter, constructing a fresh error per receiver.
pub(crate) fn reject_waiters(waiters: Vec<Waiter>, make_error: impl Fn() -> Error) {
    for waiter in waiters {
        let _ = waiter.send(Err(make_error()));
    }
}

/// A pending conversion awaiting dispatch.
pub(crate) struct QueueItem {
    pub request_id: u64,
    pub request: ConversionRequest,
    pub queued_at: DateTime<Utc>,
    /// Queue-level re-enqueue count after retryable failures.
    pub retry_count: u32,
    /// Backoff gate; the item is not dispatchable before this instant.
    pub not_before: Option<DateTime<Utc>>,
    pub waiters: Vec<Waiter>,
}

impl QueueItem {
    fn dispatchable(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_none_or(|gate| gate <= now)
    }
}

/// Per-priority pending counts, used in queue stats.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PendingCounts {
    pub urgent: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

/// Snapshot of the pending queue.
#[derive(Debug, Clone, Default)]
pub(crate) struct QueueSnapshot {
    pub total: usize,
    pub counts: PendingCounts,
    pub average_wait_secs: f64,
}

/// Priority-ordered pending queue with document-level deduplication.
///
/// Selection is highest priority first, FIFO within a priority, skipping
/// items whose backoff gate has not passed. The queue stays small (bounded
/// by distinct pending documents), so a scan per dispatch is fine.
pub(crate) struct PendingQueue {
    items: Mutex<Vec<QueueItem>>,
    next_request_id: AtomicU64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Enqueue a request, or attach the waiter to an existing item for the
    /// same document. The check and the mutation happen under one lock so
    /// two concurrent callers can never create two items.
    ///
    /// An attaching caller escalates the item's priority when its own is
    /// higher. Returns true when a new item was created.
    pub fn enqueue_or_attach(&self, request: ConversionRequest, waiter: Waiter) -> bool {
        let mut items = self.items.lock();
        if let Some(item) = items
            .iter_mut()
            .find(|item| item.request.document_id == request.document_id)
        {
            if request.priority > item.request.priority {
                item.request.priority = request.priority;
            }
            item.waiters.push(waiter);
            return false;
        }

        items.push(QueueItem {
            request_id: self.next_request_id.fetch_add(1, Ordering::Relaxed),
            request,
            queued_at: Utc::now(),
            retry_count: 0,
            not_before: None,
            waiters: vec![waiter],
        });
        true
    }

    /// Attach a waiter to the pending item for a document, if one exists.
    pub fn attach_waiter(&self, document_id: &str, waiter: Waiter) -> std::result::Result<(), Waiter> {
        let mut items = self.items.lock();
        match items
            .iter_mut()
            .find(|item| item.request.document_id == document_id)
        {
            Some(item) => {
                item.waiters.push(waiter);
                Ok(())
            }
            None => Err(waiter),
        }
    }

    /// Re-enqueue an item after a retryable failure, keeping its waiters.
    pub fn push(&self, item: QueueItem) {
        self.items.lock().push(item);
    }

    /// Remove and return the next dispatchable item, highest priority first,
    /// FIFO within a priority.
    pub fn pop_next(&self, now: DateTime<Utc>) -> Option<QueueItem> {
        let mut items = self.items.lock();
        let index = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.dispatchable(now))
            .min_by_key(|(_, item)| {
                (
                    std::cmp::Reverse(item.request.priority.rank()),
                    item.queued_at,
                    item.request_id,
                )
            })
            .map(|(index, _)| index)?;
        Some(items.remove(index))
    }

    /// Remove the pending item for a document, returning it for fan-out.
    pub fn remove_by_document(&self, document_id: &str) -> Option<QueueItem> {
        let mut items = self.items.lock();
        let index = items
            .iter()
            .position(|item| item.request.document_id == document_id)?;
        Some(items.remove(index))
    }

    /// Drain every pending item. Used during shutdown.
    pub fn drain(&self) -> Vec<QueueItem> {
        std::mem::take(&mut *self.items.lock())
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.items
            .lock()
            .iter()
            .any(|item| item.request.document_id == document_id)
    }

    /// Queued-at of the pending item for a document, if any.
    pub fn queued_at(&self, document_id: &str) -> Option<DateTime<Utc>> {
        self.items
            .lock()
            .iter()
            .find(|item| item.request.document_id == document_id)
            .map(|item| item.queued_at)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> QueueSnapshot {
        let items = self.items.lock();
        let mut counts = PendingCounts::default();
        let mut total_wait_secs = 0.0;
        for item in items.iter() {
            match item.request.priority {
                JobPriority::Urgent => counts.urgent += 1,
                JobPriority::High => counts.high += 1,
                JobPriority::Normal => counts.normal += 1,
                JobPriority::Low => counts.low += 1,
            }
            total_wait_secs += (now - item.queued_at).num_milliseconds().max(0) as f64 / 1000.0;
        }

        let total = items.len();
        QueueSnapshot {
            total,
            counts,
            average_wait_secs: if total > 0 {
                total_wait_secs / total as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn waiter() -> (Waiter, oneshot::Receiver<Result<ConversionOutcome>>) {
        let (tx, rx) = oneshot::channel();
        (tx, rx)
    }

    #[test]
    fn test_enqueue_dedups_by_document() {
        let queue = PendingQueue::new();
        let (tx1, _rx1) = waiter();
        let (tx2, _rx2) = waiter();

        assert!(queue.enqueue_or_attach(ConversionRequest::new("doc-1"), tx1));
        assert!(!queue.enqueue_or_attach(ConversionRequest::new("doc-1"), tx2));
        assert_eq!(queue.len(), 1);

        let item = queue.pop_next(Utc::now()).unwrap();
        assert_eq!(item.waiters.len(), 2);
    }

    #[test]
    fn test_attaching_caller_escalates_priority() {
        let queue = PendingQueue::new();
        let (tx1, _rx1) = waiter();
        let (tx2, _rx2) = waiter();

        queue.enqueue_or_attach(ConversionRequest::new("doc-1"), tx1);
        queue.enqueue_or_attach(
            ConversionRequest::new("doc-1").with_priority(JobPriority::Urgent),
            tx2,
        );

        let item = queue.pop_next(Utc::now()).unwrap();
        assert_eq!(item.request.priority, JobPriority::Urgent);
    }

    #[test]
    fn test_pop_priority_then_fifo() {
        let queue = PendingQueue::new();
        for (doc, priority) in [
            ("doc-low", JobPriority::Low),
            ("doc-high-1", JobPriority::High),
            ("doc-normal", JobPriority::Normal),
            ("doc-high-2", JobPriority::High),
        ] {
            let (tx, _rx) = waiter();
            queue.enqueue_or_attach(ConversionRequest::new(doc).with_priority(priority), tx);
        }

        let now = Utc::now();
        let order: Vec<String> = std::iter::from_fn(|| queue.pop_next(now))
            .map(|item| item.request.document_id)
            .collect();
        assert_eq!(order, ["doc-high-1", "doc-high-2", "doc-normal", "doc-low"]);
    }

    #[test]
    fn test_backoff_gate_skips_item() {
        let queue = PendingQueue::new();
        let (tx1, _rx1) = waiter();
        let (tx2, _rx2) = waiter();

        queue.enqueue_or_attach(
            ConversionRequest::new("doc-gated").with_priority(JobPriority::Urgent),
            tx1,
        );
        let mut gated = queue.pop_next(Utc::now()).unwrap();
        gated.not_before = Some(Utc::now() + Duration::seconds(60));
        queue.push(gated);

        queue.enqueue_or_attach(ConversionRequest::new("doc-open"), tx2);

        let next = queue.pop_next(Utc::now()).unwrap();
        assert_eq!(next.request.document_id, "doc-open");
        assert!(queue.pop_next(Utc::now()).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_by_document() {
        let queue = PendingQueue::new();
        let (tx, _rx) = waiter();
        queue.enqueue_or_attach(ConversionRequest::new("doc-1"), tx);

        assert!(queue.remove_by_document("doc-1").is_some());
        assert!(queue.remove_by_document("doc-1").is_none());
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_fan_out_resolves_all_waiters() {
        let (tx1, rx1) = waiter();
        let (tx2, rx2) = waiter();
        let outcome = ConversionOutcome {
            job_id: Some("job-1".to_string()),
            document_id: "doc-1".to_string(),
            result: serde_json::json!({"pages": 3}),
            from_cache: false,
        };

        resolve_waiters(vec![tx1, tx2], &outcome);
        assert_eq!(rx1.await.unwrap().unwrap().job_id.as_deref(), Some("job-1"));
        assert_eq!(rx2.await.unwrap().unwrap().document_id, "doc-1");
    }

    #[test]
    fn test_snapshot_counts() {
        let queue = PendingQueue::new();
        for (doc, priority) in [
            ("a", JobPriority::Urgent),
            ("b", JobPriority::Normal),
            ("c", JobPriority::Normal),
        ] {
            let (tx, _rx) = waiter();
            queue.enqueue_or_attach(ConversionRequest::new(doc).with_priority(priority), tx);
        }

        let snapshot = queue.snapshot(Utc::now());
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.counts.urgent, 1);
        assert_eq!(snapshot.counts.normal, 2);
    }
}
