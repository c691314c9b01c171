use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Local status of a detection job.
///
/// `Pending`, `Submitted` and `Running` are non-terminal; every other state is
/// final and never transitions again.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr,
)]
pub enum JobStatus {
    Pending,
    Submitted,
    Running,
    Success,
    Error,
    #[serde(rename = "Timed Out")]
    #[strum(serialize = "Timed Out")]
    TimedOut,
    Cancelled,
}

impl JobStatus {
    /// Statuses the worker keeps polling.
    pub const NON_TERMINAL: [JobStatus; 3] =
        [JobStatus::Pending, JobStatus::Submitted, JobStatus::Running];

    pub fn is_terminal(self) -> bool {
        !Self::NON_TERMINAL.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Stage of the job lifecycle a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
pub enum ExecutionStep {
    /// The algorithm itself reported an error.
    #[strum(serialize = "algorithm")]
    Algorithm,
    #[strum(serialize = "polling")]
    Polling,
    #[strum(serialize = "queued timeout")]
    QueuedTimeout,
    #[strum(serialize = "processing timeout")]
    ProcessingTimeout,
    #[strum(serialize = "resolve-detections-data-id")]
    ResolveDetectionsDataId,
    /// Fetching or storing the detection GeoJSON.
    #[strum(serialize = "collect-geojson")]
    CollectGeojson,
}

impl ExecutionStep {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// A detection job tracked from submission to terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Assigned by the execution platform at submission.
    pub job_id: String,
    pub algorithm_name: String,
    pub algorithm_version: String,
    pub name: String,
    pub created_by: String,
    pub created_on: DateTime<Utc>,
    pub scene_id: String,
    pub geometry: serde_json::Value,
    pub tide: Option<f64>,
    pub tide_min_24h: Option<f64>,
    pub tide_max_24h: Option<f64>,
    pub status: JobStatus,
    pub detections_id: Option<String>,
}

/// Projection of a non-terminal job, as listed by the worker each cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct OutstandingJob {
    pub job_id: String,
    pub created_on: DateTime<Utc>,
    pub status: JobStatus,
}

impl OutstandingJob {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_on
    }
}

/// Failure detail recorded alongside an `Error` or `Timed Out` job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub job_id: String,
    pub execution_step: ExecutionStep,
    pub error_message: String,
}
