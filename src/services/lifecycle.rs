//! Job status state machine.
//!
//! [`evaluate`] decides, from one remote status snapshot and the job's age,
//! what the worker must do with a non-terminal job. It performs no I/O; the
//! poller carries out the returned [`Transition`].

use chrono::Duration;

use crate::models::job::{ExecutionStep, JobStatus};
use crate::services::execution::{ExecutionError, ExecutionStatus, RemoteStatus};

const DEFAULT_ALGORITHM_ERROR: &str = "Service reported error during processing";
const QUEUED_TIMEOUT_MESSAGE: &str = "Submission wait time exceeded";
const PROCESSING_TIMEOUT_MESSAGE: &str = "Processing time exceeded";
const NOT_FOUND_MESSAGE: &str = "Job not found on execution platform";

/// Action implied by a single poll of a non-terminal job.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Still queued or running within the TTL.
    Unchanged,
    /// Remote success; postprocessing must resolve `output_id` before committing.
    Postprocess { output_id: Option<String> },
    /// Commit a failure terminal state with its detail.
    Fail {
        status: JobStatus,
        step: ExecutionStep,
        message: String,
    },
    Cancel,
}

impl Transition {
    fn fail(status: JobStatus, step: ExecutionStep, message: impl Into<String>) -> Self {
        Transition::Fail {
            status,
            step,
            message: message.into(),
        }
    }
}

/// Reason a poll did not yield a usable status.
#[derive(Debug, thiserror::Error)]
pub enum PollFault {
    #[error("Execution platform rejected credentials")]
    Unauthorized,

    #[error("Job not found on execution platform")]
    NotFound,

    #[error("Remote call failed: {0}")]
    Remote(ExecutionError),

    #[error("Unrecognized remote status: {0}")]
    UnrecognizedStatus(String),
}

impl From<ExecutionError> for PollFault {
    fn from(e: ExecutionError) -> Self {
        match e {
            ExecutionError::Unauthorized => PollFault::Unauthorized,
            ExecutionError::NotFound => PollFault::NotFound,
            other => PollFault::Remote(other),
        }
    }
}

impl PollFault {
    /// A permanent fault commits the job as `Error`; any other fault leaves
    /// the job untouched for the next cycle.
    pub fn permanent_transition(&self) -> Option<Transition> {
        match self {
            PollFault::NotFound => Some(Transition::fail(
                JobStatus::Error,
                ExecutionStep::Polling,
                NOT_FOUND_MESSAGE,
            )),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PollFault::Unauthorized => "unauthorized",
            PollFault::NotFound => "not_found",
            PollFault::Remote(e) => e.kind(),
            PollFault::UnrecognizedStatus(_) => "unrecognized_status",
        }
    }
}

/// Evaluate one poll result against the transition table.
pub fn evaluate(
    remote: &ExecutionStatus,
    age: Duration,
    ttl: Duration,
) -> Result<Transition, PollFault> {
    let expired = age >= ttl;

    let transition = match &remote.status {
        RemoteStatus::Pending | RemoteStatus::Submitted if expired => Transition::fail(
            JobStatus::TimedOut,
            ExecutionStep::QueuedTimeout,
            QUEUED_TIMEOUT_MESSAGE,
        ),
        // An unrecognized status still counts against the TTL.
        RemoteStatus::Running | RemoteStatus::Cancelling | RemoteStatus::Unknown(_)
            if expired =>
        {
            Transition::fail(
                JobStatus::TimedOut,
                ExecutionStep::ProcessingTimeout,
                PROCESSING_TIMEOUT_MESSAGE,
            )
        }
        RemoteStatus::Pending
        | RemoteStatus::Submitted
        | RemoteStatus::Running
        | RemoteStatus::Cancelling => Transition::Unchanged,
        RemoteStatus::Success => Transition::Postprocess {
            output_id: remote.data_id.clone(),
        },
        RemoteStatus::Error | RemoteStatus::Fail => {
            let message = remote
                .error_message
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(DEFAULT_ALGORITHM_ERROR);
            Transition::fail(JobStatus::Error, ExecutionStep::Algorithm, message)
        }
        RemoteStatus::Cancelled => Transition::Cancel,
        RemoteStatus::Unknown(raw) => return Err(PollFault::UnrecognizedStatus(raw.clone())),
    };

    Ok(transition)
}
