//! Conversion job domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job is queued and waiting to be dispatched.
    Queued,
    /// Job is currently being processed.
    Processing,
    /// Job finished successfully.
    Completed,
    /// Job failed after exhausting retries.
    Failed,
    /// Job was cancelled by the caller.
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(Self::Queued),
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if a job in this status counts as active for dedup purposes.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }
}

/// Fine-grained phase within a conversion, mapped to a fixed progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStage {
    Queued,
    Initializing,
    ProcessingPages,
    UploadingPages,
    Completed,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Initializing => "INITIALIZING",
            Self::ProcessingPages => "PROCESSING_PAGES",
            Self::UploadingPages => "UPLOADING_PAGES",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(Self::Queued),
            "INITIALIZING" => Some(Self::Initializing),
            "PROCESSING_PAGES" => Some(Self::ProcessingPages),
            "UPLOADING_PAGES" => Some(Self::UploadingPages),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Fixed stage-to-progress mapping.
    pub fn progress_percent(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Initializing => 10,
            Self::ProcessingPages => 40,
            Self::UploadingPages => 80,
            Self::Completed => 100,
            Self::Failed => 100,
        }
    }
}

/// Job priority. Higher values dispatch first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl JobPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Self::Low),
            "NORMAL" => Some(Self::Normal),
            "HIGH" => Some(Self::High),
            "URGENT" => Some(Self::Urgent),
            _ => None,
        }
    }

    /// Numeric rank used for dispatch ordering (higher dispatches first).
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
            Self::Urgent => 3,
        }
    }
}

/// A persisted conversion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    /// Unique job ID.
    pub id: String,
    /// Natural key used for active-job deduplication.
    pub document_id: String,
    /// Member who requested the conversion, if known.
    pub member_id: Option<String>,
    /// Current status.
    pub status: JobStatus,
    /// Current stage within the conversion.
    pub stage: JobStage,
    /// Priority for dispatch ordering.
    pub priority: JobPriority,
    /// Progress percentage (0-100).
    pub progress: u8,
    /// Number of retry attempts so far.
    pub retry_count: u32,
    /// Total pages in the document, once known.
    pub total_pages: Option<u32>,
    /// Pages processed so far, once known.
    pub processed_pages: Option<u32>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the job first transitioned into processing.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached completed/failed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Not-before gate for re-dispatch after a retryable failure.
    pub estimated_completion: Option<DateTime<Utc>>,
    /// Error message if failed.
    pub error_message: Option<String>,
    /// Opaque conversion output, present only when completed.
    pub result_data: Option<serde_json::Value>,
}

impl ConversionJob {
    /// Create a new queued job for a document.
    pub fn new(document_id: impl Into<String>, priority: JobPriority) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            member_id: None,
            status: JobStatus::Queued,
            stage: JobStage::Queued,
            priority,
            progress: 0,
            retry_count: 0,
            total_pages: None,
            processed_pages: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            estimated_completion: None,
            error_message: None,
            result_data: None,
        }
    }

    /// Set the requesting member.
    pub fn with_member_id(mut self, member_id: impl Into<String>) -> Self {
        self.member_id = Some(member_id.into());
        self
    }
}

/// Partial update applied to a job by [`super::JobManager::update_job`].
///
/// `None` fields are left unchanged. Progress is derived from the stage when
/// a stage is supplied without an explicit progress value.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub stage: Option<JobStage>,
    pub progress: Option<u8>,
    pub total_pages: Option<u32>,
    pub processed_pages: Option<u32>,
    pub error_message: Option<String>,
    pub result_data: Option<serde_json::Value>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_stage(mut self, stage: JobStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_total_pages(mut self, pages: u32) -> Self {
        self.total_pages = Some(pages);
        self
    }

    pub fn with_processed_pages(mut self, pages: u32) -> Self {
        self.processed_pages = Some(pages);
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_result_data(mut self, data: serde_json::Value) -> Self {
        self.result_data = Some(data);
        self
    }
}

/// Progress snapshot for a document's conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: String,
    pub document_id: String,
    pub status: JobStatus,
    pub stage: JobStage,
    pub progress: u8,
    pub total_pages: Option<u32>,
    pub processed_pages: Option<u32>,
    pub error_message: Option<String>,
}

impl From<&ConversionJob> for JobProgress {
    fn from(job: &ConversionJob) -> Self {
        Self {
            job_id: job.id.clone(),
            document_id: job.document_id.clone(),
            status: job.status,
            stage: job.stage,
            progress: job.progress,
            total_pages: job.total_pages,
            processed_pages: job.processed_pages,
            error_message: job.error_message.clone(),
        }
    }
}

/// Aggregate job metrics over a rolling 24-hour window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMetrics {
    /// Number of queued jobs.
    pub queue_depth: u64,
    /// Number of jobs currently processing.
    pub active_jobs: u64,
    /// Average processing time of completed jobs in seconds.
    pub average_processing_secs: f64,
    /// Fraction of terminal jobs that completed successfully.
    pub success_rate: f64,
    /// Fraction of terminal jobs that failed.
    pub failure_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_new() {
        let job = ConversionJob::new("doc-1", JobPriority::Normal);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.stage, JobStage::Queued);
        assert_eq!(job.progress, 0);
        assert_eq!(job.retry_count, 0);
        assert!(job.result_data.is_none());
    }

    #[test]
    fn test_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_status_active() {
        assert!(JobStatus::Queued.is_active());
        assert!(JobStatus::Processing.is_active());
        assert!(!JobStatus::Completed.is_active());
    }

    #[test]
    fn test_stage_progress_mapping() {
        assert_eq!(JobStage::Queued.progress_percent(), 0);
        assert_eq!(JobStage::Initializing.progress_percent(), 10);
        assert_eq!(JobStage::ProcessingPages.progress_percent(), 40);
        assert_eq!(JobStage::UploadingPages.progress_percent(), 80);
        assert_eq!(JobStage::Completed.progress_percent(), 100);
        assert_eq!(JobStage::Failed.progress_percent(), 100);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(JobPriority::Urgent > JobPriority::High);
        assert!(JobPriority::High > JobPriority::Normal);
        assert!(JobPriority::Normal > JobPriority::Low);
        assert_eq!(JobPriority::Urgent.rank(), 3);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("BOGUS"), None);
    }
}
