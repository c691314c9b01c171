//! Contract the orchestrator needs from storage.

use async_trait::async_trait;

use crate::models::job::{ExecutionStep, Job, JobStatus, OutstandingJob};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a freshly dispatched job together with its owner association.
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Jobs still in a non-terminal status, oldest first.
    async fn select_outstanding_jobs(&self) -> Result<Vec<OutstandingJob>, StoreError>;

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        detections_id: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn insert_job_failure(
        &self,
        job_id: &str,
        execution_step: ExecutionStep,
        error_message: &str,
    ) -> Result<(), StoreError>;

    /// Store the detection GeoJSON produced by a job.
    async fn insert_detection(&self, job_id: &str, content: &str) -> Result<(), StoreError>;

    /// Store the detections and mark the job `Success`, atomically.
    ///
    /// A job that is already terminal is left alone and no detection is stored.
    async fn commit_success(
        &self,
        job_id: &str,
        detections_id: &str,
        content: &str,
    ) -> Result<(), StoreError>;

    /// Record the failure detail and move the job to `status`, atomically.
    ///
    /// A job that is already terminal is left alone and no detail is recorded.
    async fn commit_failure(
        &self,
        job_id: &str,
        status: JobStatus,
        execution_step: ExecutionStep,
        error_message: &str,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
