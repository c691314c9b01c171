//! Contract for the remote execution platform.
//!
//! The orchestrator only ever talks to the platform through [`ExecutionClient`];
//! the HTTP implementation lives in [`crate::services::piazza`].

use async_trait::async_trait;
use std::str::FromStr;
use strum::{Display, EnumString};

/// Status vocabulary reported by the execution platform.
#[derive(Debug, Clone, PartialEq, Eq, Display, EnumString)]
pub enum RemoteStatus {
    Pending,
    Submitted,
    Running,
    Cancelling,
    Success,
    Error,
    Fail,
    Cancelled,
    /// Anything the platform reports outside the known vocabulary.
    #[strum(default)]
    Unknown(String),
}

impl RemoteStatus {
    pub fn parse(raw: &str) -> Self {
        // `strum(default)` makes this infallible.
        RemoteStatus::from_str(raw).unwrap_or_else(|_| RemoteStatus::Unknown(raw.to_string()))
    }
}

/// Snapshot of a remote job as returned by a status poll.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStatus {
    pub status: RemoteStatus,
    /// Identifier of the execution output, present on success.
    pub data_id: Option<String>,
    /// Failure message, present on some error results.
    pub error_message: Option<String>,
}

impl ExecutionStatus {
    pub fn new(status: RemoteStatus) -> Self {
        Self {
            status,
            data_id: None,
            error_message: None,
        }
    }
}

#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Submit a job to the given service. Returns the platform-assigned job id.
    async fn submit(
        &self,
        service_id: &str,
        inputs: serde_json::Value,
    ) -> Result<String, ExecutionError>;

    async fn get_status(&self, job_id: &str) -> Result<ExecutionStatus, ExecutionError>;

    /// Fetch the text content of a stored file.
    async fn get_file(&self, data_id: &str) -> Result<String, ExecutionError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    #[error("Execution platform rejected credentials")]
    Unauthorized,

    #[error("Resource not found on execution platform")]
    NotFound,

    #[error("Execution platform unreachable: {0}")]
    Unreachable(String),

    #[error("Execution platform error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("Invalid response from execution platform: {0}")]
    InvalidResponse(String),
}

impl ExecutionError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::Unauthorized => "unauthorized",
            ExecutionError::NotFound => "not_found",
            ExecutionError::Unreachable(_) => "unreachable",
            ExecutionError::ServerError { .. } => "server_error",
            ExecutionError::InvalidResponse(_) => "invalid_response",
        }
    }
}
