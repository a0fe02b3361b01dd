//! Conversion job domain: model, manager, and background maintenance.

pub mod maintenance;
pub mod manager;
pub mod model;

pub use maintenance::MaintenanceService;
pub use manager::{JobManager, NoopProgressBroadcaster, ProgressBroadcaster};
pub use model::{
    ConversionJob, JobMetrics, JobPriority, JobProgress, JobStage, JobStatus, JobUpdate,
};
