//! Database row models.
//!
//! Rows store timestamps as RFC 3339 TEXT and enums as their string form;
//! converters translate between rows and the domain types. A row whose
//! status/stage/priority no longer parses surfaces as a database error
//! instead of being silently coerced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::cache::CachedResult;
use crate::job::{ConversionJob, JobPriority, JobStage, JobStatus};
use crate::{Error, Result};

/// Conversion job database row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobRow {
    pub id: String,
    pub document_id: String,
    pub member_id: Option<String>,
    /// Status: QUEUED, PROCESSING, COMPLETED, FAILED, CANCELLED
    pub status: String,
    /// Stage: QUEUED, INITIALIZING, PROCESSING_PAGES, UPLOADING_PAGES, ...
    pub stage: String,
    /// Priority: URGENT, HIGH, NORMAL, LOW
    pub priority: String,
    pub progress: i64,
    pub retry_count: i64,
    pub total_pages: Option<i64>,
    pub processed_pages: Option<i64>,
    /// ISO 8601 timestamps.
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub estimated_completion: Option<String>,
    pub error_message: Option<String>,
    /// JSON blob, present only for completed jobs.
    pub result_data: Option<String>,
}

/// Cache entry database row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CacheRow {
    pub document_id: String,
    /// JSON blob with the conversion output.
    pub result: String,
    pub document_version: Option<String>,
    pub created_at: String,
    pub last_accessed_at: String,
    pub access_count: i64,
    pub expires_at: String,
    pub size_bytes: i64,
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("invalid {column} timestamp '{value}': {e}")))
}

fn parse_optional_timestamp(value: Option<&str>, column: &str) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(v, column)).transpose()
}

impl JobRow {
    pub fn from_job(job: &ConversionJob) -> Result<Self> {
        Ok(Self {
            id: job.id.clone(),
            document_id: job.document_id.clone(),
            member_id: job.member_id.clone(),
            status: job.status.as_str().to_string(),
            stage: job.stage.as_str().to_string(),
            priority: job.priority.as_str().to_string(),
            progress: job.progress as i64,
            retry_count: job.retry_count as i64,
            total_pages: job.total_pages.map(|p| p as i64),
            processed_pages: job.processed_pages.map(|p| p as i64),
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
            started_at: job.started_at.map(|t| t.to_rfc3339()),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
            estimated_completion: job.estimated_completion.map(|t| t.to_rfc3339()),
            error_message: job.error_message.clone(),
            result_data: job
                .result_data
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        })
    }

    pub fn into_job(self) -> Result<ConversionJob> {
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| Error::Database(format!("invalid job status '{}'", self.status)))?;
        let stage = JobStage::parse(&self.stage)
            .ok_or_else(|| Error::Database(format!("invalid job stage '{}'", self.stage)))?;
        let priority = JobPriority::parse(&self.priority)
            .ok_or_else(|| Error::Database(format!("invalid job priority '{}'", self.priority)))?;

        Ok(ConversionJob {
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            updated_at: parse_timestamp(&self.updated_at, "updated_at")?,
            started_at: parse_optional_timestamp(self.started_at.as_deref(), "started_at")?,
            completed_at: parse_optional_timestamp(self.completed_at.as_deref(), "completed_at")?,
            estimated_completion: parse_optional_timestamp(
                self.estimated_completion.as_deref(),
                "estimated_completion",
            )?,
            result_data: self
                .result_data
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            id: self.id,
            document_id: self.document_id,
            member_id: self.member_id,
            status,
            stage,
            priority,
            progress: self.progress.clamp(0, 100) as u8,
            retry_count: self.retry_count.max(0) as u32,
            total_pages: self.total_pages.map(|p| p.max(0) as u32),
            processed_pages: self.processed_pages.map(|p| p.max(0) as u32),
            error_message: self.error_message,
        })
    }
}

impl CacheRow {
    pub fn from_result(entry: &CachedResult) -> Result<Self> {
        Ok(Self {
            document_id: entry.document_id.clone(),
            result: serde_json::to_string(&entry.result)?,
            document_version: entry.document_version.clone(),
            created_at: entry.created_at.to_rfc3339(),
            last_accessed_at: entry.last_accessed_at.to_rfc3339(),
            access_count: entry.access_count as i64,
            expires_at: entry.expires_at.to_rfc3339(),
            size_bytes: entry.size_bytes as i64,
        })
    }

    pub fn into_result(self) -> Result<CachedResult> {
        Ok(CachedResult {
            result: serde_json::from_str(&self.result)?,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            last_accessed_at: parse_timestamp(&self.last_accessed_at, "last_accessed_at")?,
            expires_at: parse_timestamp(&self.expires_at, "expires_at")?,
            document_id: self.document_id,
            document_version: self.document_version,
            access_count: self.access_count.max(0) as u64,
            size_bytes: self.size_bytes.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_row_roundtrip() {
        let mut job = ConversionJob::new("doc-1", JobPriority::High).with_member_id("member-9");
        job.result_data = Some(serde_json::json!({"pages": ["p1.png"]}));
        job.total_pages = Some(3);

        let row = JobRow::from_job(&job).unwrap();
        assert_eq!(row.status, "QUEUED");
        assert_eq!(row.priority, "HIGH");

        let back = row.into_job().unwrap();
        assert_eq!(back.id, job.id);
        assert_eq!(back.document_id, "doc-1");
        assert_eq!(back.member_id.as_deref(), Some("member-9"));
        assert_eq!(back.total_pages, Some(3));
        assert_eq!(back.result_data, job.result_data);
    }

    #[test]
    fn test_job_row_invalid_status() {
        let job = ConversionJob::new("doc-1", JobPriority::Normal);
        let mut row = JobRow::from_job(&job).unwrap();
        row.status = "EXPLODED".to_string();
        assert!(row.into_job().is_err());
    }
}
