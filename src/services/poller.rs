//! Background status poller.
//!
//! One [`StatusWorker`] runs per process. Each cycle it lists the non-terminal
//! jobs, polls them one at a time, and commits whatever transition the state
//! machine implies. Storage faults abandon the cycle and go through the
//! [`FailureSupervisor`]; remote faults only affect the job being polled.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::models::job::{ExecutionStep, JobStatus, OutstandingJob};
use crate::services::dispatcher::OUTPUT_FILENAME;
use crate::services::execution::ExecutionClient;
use crate::services::lifecycle::{self, PollFault, Transition};
use crate::services::persistence::{JobStore, StoreError};
use crate::services::supervisor::{Escalation, FailureSupervisor, DEFAULT_MAX_CONSECUTIVE_FAILURES};

/// Timing and retry knobs for the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Time between the start of consecutive cycles.
    pub interval: Duration,
    /// Maximum age of a non-terminal job before it is timed out.
    pub job_ttl: Duration,
    /// Sleep increment; bounds how long a stop request can go unnoticed.
    pub sleep_slice: Duration,
    pub max_storage_failures: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            job_ttl: Duration::from_secs(2 * 60 * 60),
            sleep_slice: Duration::from_secs(5),
            max_storage_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

/// Counts for a single cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub polled: usize,
    pub unchanged: usize,
    pub transitioned: usize,
    pub faults: usize,
}

/// How the worker loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Stopped on request.
    Stopped,
    /// Gave up after too many consecutive storage faults.
    Fatal { consecutive_failures: u32 },
    /// The worker task panicked; the panic did not reach the host.
    Panicked,
}

enum PollOutcome {
    Unchanged,
    Transitioned,
    Fault,
}

/// Detections fetched for a successful job, ready to be stored.
struct Detections {
    data_id: String,
    geojson: String,
}

/// A failed postprocessing stage.
struct PostprocessFailure {
    step: ExecutionStep,
    message: String,
}

impl PostprocessFailure {
    fn new(step: ExecutionStep, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

pub struct StatusWorker {
    store: Arc<dyn JobStore>,
    execution: Arc<dyn ExecutionClient>,
    settings: WorkerSettings,
    ttl: chrono::Duration,
}

impl StatusWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        execution: Arc<dyn ExecutionClient>,
        mut settings: WorkerSettings,
    ) -> Self {
        if settings.sleep_slice.is_zero() {
            settings.sleep_slice = Duration::from_secs(1);
        }
        let ttl = chrono::Duration::from_std(settings.job_ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            store,
            execution,
            settings,
            ttl,
        }
    }

    /// Spawn the polling loop on its own task.
    pub fn start(self) -> WorkerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        WorkerHandle { cancel, task }
    }

    /// Run cycles until `cancel` fires or the supervisor gives up.
    pub async fn run(&self, cancel: CancellationToken) -> WorkerExit {
        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            job_ttl_secs = self.settings.job_ttl.as_secs(),
            "Status worker started"
        );

        let mut supervisor = FailureSupervisor::new(self.settings.max_storage_failures);

        while !cancel.is_cancelled() {
            let next_cycle = Instant::now() + self.settings.interval;

            match self.run_cycle(Utc::now()).await {
                Ok(report) => {
                    supervisor.record_success();
                    tracing::debug!(
                        polled = report.polled,
                        unchanged = report.unchanged,
                        transitioned = report.transitioned,
                        faults = report.faults,
                        "Cycle complete"
                    );
                }
                Err(e) => {
                    if let Escalation::Fatal {
                        consecutive_failures,
                    } = supervisor.record_failure(&e)
                    {
                        tracing::error!(consecutive_failures, "Status worker terminated");
                        return WorkerExit::Fatal {
                            consecutive_failures,
                        };
                    }
                }
            }

            self.sleep_until(next_cycle, &cancel).await;
        }

        tracing::info!("Status worker stopped");
        WorkerExit::Stopped
    }

    /// Sleep in slices so a stop request is seen within one slice.
    async fn sleep_until(&self, deadline: Instant, cancel: &CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            sleep((deadline - now).min(self.settings.sleep_slice)).await;
        }
    }

    /// Poll every outstanding job once, as of `now`.
    ///
    /// Returns the first storage fault encountered; the remaining jobs of the
    /// cycle are left for the next one.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, StoreError> {
        let jobs = self.store.select_outstanding_jobs().await?;
        metrics::gauge!("worker_outstanding_jobs").set(jobs.len() as f64);

        let mut report = CycleReport::default();
        if jobs.is_empty() {
            tracing::info!("No outstanding jobs, nothing to poll");
            return Ok(report);
        }

        let total = jobs.len();
        tracing::info!(count = total, "Polling outstanding jobs");

        for (i, job) in jobs.iter().enumerate() {
            report.polled += 1;
            match self.poll_job(i + 1, total, job, now).await? {
                PollOutcome::Unchanged => report.unchanged += 1,
                PollOutcome::Transitioned => report.transitioned += 1,
                PollOutcome::Fault => report.faults += 1,
            }
        }

        Ok(report)
    }

    async fn poll_job(
        &self,
        index: usize,
        total: usize,
        job: &OutstandingJob,
        now: DateTime<Utc>,
    ) -> Result<PollOutcome, StoreError> {
        metrics::counter!("job_polls_total").increment(1);
        let age = job.age(now);

        tracing::info!(
            job_id = %job.job_id,
            index,
            total,
            status = %job.status,
            age_secs = age.num_seconds(),
            "Polling job"
        );

        let polled = self
            .execution
            .get_status(&job.job_id)
            .await
            .map_err(PollFault::from)
            .and_then(|remote| {
                tracing::debug!(job_id = %job.job_id, remote_status = %remote.status, "Remote status");
                lifecycle::evaluate(&remote, age, self.ttl)
            });

        let transition = match polled {
            Ok(transition) => transition,
            Err(fault) => {
                metrics::counter!("job_poll_faults_total", "kind" => fault.kind()).increment(1);
                match fault.permanent_transition() {
                    Some(transition) => {
                        tracing::warn!(job_id = %job.job_id, error = %fault, "Permanent poll fault");
                        transition
                    }
                    None => {
                        log_transient_fault(&job.job_id, &fault);
                        return Ok(PollOutcome::Fault);
                    }
                }
            }
        };

        self.apply(&job.job_id, transition).await
    }

    async fn apply(&self, job_id: &str, transition: Transition) -> Result<PollOutcome, StoreError> {
        match transition {
            Transition::Unchanged => {
                tracing::debug!(job_id, "Job still in progress");
                Ok(PollOutcome::Unchanged)
            }
            Transition::Fail {
                status,
                step,
                message,
            } => self.commit_failure(job_id, status, step, &message).await,
            Transition::Cancel => {
                self.store
                    .update_status(job_id, JobStatus::Cancelled, None)
                    .await?;
                record_transition(job_id, JobStatus::Cancelled);
                Ok(PollOutcome::Transitioned)
            }
            Transition::Postprocess { output_id } => {
                let detections = match self.postprocess(job_id, output_id.as_deref()).await {
                    Ok(detections) => detections,
                    Err(failure) => {
                        return self
                            .commit_failure(job_id, JobStatus::Error, failure.step, &failure.message)
                            .await;
                    }
                };

                let committed = self
                    .store
                    .commit_success(job_id, &detections.data_id, &detections.geojson)
                    .await;
                match committed {
                    Ok(()) => {
                        record_transition(job_id, JobStatus::Success);
                        Ok(PollOutcome::Transitioned)
                    }
                    Err(e) => {
                        let message = format!("Could not save detections to database: {}", e);
                        self.commit_failure(
                            job_id,
                            JobStatus::Error,
                            ExecutionStep::CollectGeojson,
                            &message,
                        )
                        .await
                    }
                }
            }
        }
    }

    /// Resolve and fetch the detections of a successful job.
    async fn postprocess(
        &self,
        job_id: &str,
        output_id: Option<&str>,
    ) -> Result<Detections, PostprocessFailure> {
        let output_id = output_id.ok_or_else(|| {
            PostprocessFailure::new(
                ExecutionStep::ResolveDetectionsDataId,
                "Execution succeeded without an output data id",
            )
        })?;

        tracing::debug!(job_id, output_id, "Resolving detections data id");
        let output = self.execution.get_file(output_id).await.map_err(|e| {
            PostprocessFailure::new(
                ExecutionStep::ResolveDetectionsDataId,
                format!("Could not fetch execution output: {}", e),
            )
        })?;
        let detections_id = resolve_detections_data_id(&output).map_err(|reason| {
            PostprocessFailure::new(ExecutionStep::ResolveDetectionsDataId, reason)
        })?;

        tracing::debug!(job_id, detections_id = %detections_id, "Fetching detections");
        let geojson = self.execution.get_file(&detections_id).await.map_err(|e| {
            PostprocessFailure::new(
                ExecutionStep::CollectGeojson,
                format!("Could not fetch detections: {}", e),
            )
        })?;

        Ok(Detections {
            data_id: detections_id,
            geojson,
        })
    }

    async fn commit_failure(
        &self,
        job_id: &str,
        status: JobStatus,
        step: ExecutionStep,
        message: &str,
    ) -> Result<PollOutcome, StoreError> {
        self.store.commit_failure(job_id, status, step, message).await?;

        tracing::warn!(job_id, status = %status, step = %step, error = message, "Job failed");
        metrics::counter!("job_transitions_total", "status" => status.as_str()).increment(1);
        Ok(PollOutcome::Transitioned)
    }
}

fn record_transition(job_id: &str, status: JobStatus) {
    tracing::info!(job_id, status = %status, "Job reached terminal status");
    metrics::counter!("job_transitions_total", "status" => status.as_str()).increment(1);
}

fn log_transient_fault(job_id: &str, fault: &PollFault) {
    match fault {
        PollFault::Unauthorized => tracing::error!(
            job_id,
            "Execution platform rejected credentials, will retry next cycle"
        ),
        _ => tracing::warn!(job_id, error = %fault, "Poll failed, will retry next cycle"),
    }
}

/// Extract the detections data id from an execution output document.
fn resolve_detections_data_id(output: &str) -> Result<String, String> {
    let document: serde_json::Value = serde_json::from_str(output)
        .map_err(|e| format!("Execution output is not valid JSON: {}", e))?;

    document
        .get("OutFiles")
        .and_then(|files| files.get(OUTPUT_FILENAME))
        .and_then(|id| id.as_str())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("Execution output does not list {}", OUTPUT_FILENAME))
}

/// Handle to a running [`StatusWorker`].
pub struct WorkerHandle {
    cancel: CancellationToken,
    task: JoinHandle<WorkerExit>,
}

impl WorkerHandle {
    /// Ask the worker to stop after its current sleep slice.
    pub fn stop(&self) {
        tracing::info!("Stopping status worker");
        self.cancel.cancel();
    }

    /// Token that stops the worker when cancelled, for wiring to signals.
    pub fn stopper(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> WorkerExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                tracing::error!(error = %e, "Status worker task ended abnormally");
                WorkerExit::Panicked
            }
        }
    }
}
