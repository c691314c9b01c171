//! In-memory stand-ins for the storage, execution platform and catalogs

#![allow(dead_code)]

use async_trait::async_trait;
use beachfront_jobs::models::catalog::{Algorithm, Scene};
use beachfront_jobs::models::job::{ExecutionStep, Job, JobFailure, JobStatus, OutstandingJob};
use beachfront_jobs::services::catalog::{AlgorithmCatalog, CatalogError, SceneCatalog};
use beachfront_jobs::services::execution::{
    ExecutionClient, ExecutionError, ExecutionStatus, RemoteStatus,
};
use beachfront_jobs::services::persistence::{JobStore, StoreError};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

fn storage_fault() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

fn duplicate_detection(job_id: &str) -> StoreError {
    StoreError::Database(sqlx::Error::Protocol(format!(
        "duplicate key value violates unique constraint \"detections_pkey\" ({})",
        job_id
    )))
}

/// Recorded state and fault injection for [`FakeStore`]
#[derive(Default)]
pub struct StoreState {
    pub jobs: Vec<Job>,
    pub job_users: Vec<(String, String)>,
    pub failures: Vec<JobFailure>,
    pub detections: Vec<(String, String)>,
    /// Every call made through the contract, by name
    pub calls: Vec<&'static str>,
    /// Fail this many upcoming list calls
    pub list_failures: usize,
    pub panic_on_list: bool,
    pub fail_insert_job: bool,
    pub fail_updates: bool,
    pub fail_detection: bool,
    /// Fail this many upcoming commits, writing nothing
    pub failing_commits: usize,
}

impl StoreState {
    fn outstanding_job(&mut self, job_id: &str) -> Option<&mut Job> {
        self.jobs
            .iter_mut()
            .find(|j| j.job_id == job_id && !j.status.is_terminal())
    }

    fn take_commit_fault(&mut self) -> bool {
        if self.failing_commits > 0 {
            self.failing_commits -= 1;
            true
        } else {
            false
        }
    }
}

#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<StoreState>,
}

impl FakeStore {
    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        let store = Self::default();
        store.state().jobs = jobs;
        store
    }

    pub fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.lock().unwrap()
    }

    pub fn job(&self, job_id: &str) -> Job {
        self.state()
            .jobs
            .iter()
            .find(|j| j.job_id == job_id)
            .cloned()
            .unwrap_or_else(|| panic!("no job {}", job_id))
    }

    pub fn failures_for(&self, job_id: &str) -> Vec<JobFailure> {
        self.state()
            .failures
            .iter()
            .filter(|f| f.job_id == job_id)
            .cloned()
            .collect()
    }

    pub fn detections_for(&self, job_id: &str) -> Vec<String> {
        self.state()
            .detections
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, content)| content.clone())
            .collect()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == name).count()
    }
}

#[async_trait]
impl JobStore for FakeStore {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push("insert_job");
        if state.fail_insert_job {
            return Err(storage_fault());
        }
        state.jobs.push(job.clone());
        state.job_users.push((job.job_id.clone(), job.created_by.clone()));
        Ok(())
    }

    async fn select_outstanding_jobs(&self) -> Result<Vec<OutstandingJob>, StoreError> {
        let mut state = self.state();
        state.calls.push("select_outstanding_jobs");
        if state.panic_on_list {
            drop(state);
            panic!("storage driver bug");
        }
        if state.list_failures > 0 {
            state.list_failures -= 1;
            return Err(storage_fault());
        }

        let mut outstanding: Vec<OutstandingJob> = state
            .jobs
            .iter()
            .filter(|j| !j.status.is_terminal())
            .map(|j| OutstandingJob {
                job_id: j.job_id.clone(),
                created_on: j.created_on,
                status: j.status,
            })
            .collect();
        outstanding.sort_by_key(|j| j.created_on);
        Ok(outstanding)
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        detections_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push("update_status");
        if state.fail_updates {
            return Err(storage_fault());
        }
        if let Some(job) = state.outstanding_job(job_id) {
            job.status = status;
            job.detections_id = detections_id.map(str::to_string);
        }
        Ok(())
    }

    async fn insert_job_failure(
        &self,
        job_id: &str,
        execution_step: ExecutionStep,
        error_message: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push("insert_job_failure");
        if state.fail_updates {
            return Err(storage_fault());
        }
        state.failures.push(JobFailure {
            job_id: job_id.to_string(),
            execution_step,
            error_message: error_message.to_string(),
        });
        Ok(())
    }

    async fn insert_detection(&self, job_id: &str, content: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push("insert_detection");
        if state.fail_detection {
            return Err(storage_fault());
        }
        if state.detections.iter().any(|(id, _)| id == job_id) {
            return Err(duplicate_detection(job_id));
        }
        state
            .detections
            .push((job_id.to_string(), content.to_string()));
        Ok(())
    }

    async fn commit_success(
        &self,
        job_id: &str,
        detections_id: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push("commit_success");
        if state.take_commit_fault() || state.fail_detection {
            return Err(storage_fault());
        }
        if state.outstanding_job(job_id).is_none() {
            return Ok(());
        }
        if state.detections.iter().any(|(id, _)| id == job_id) {
            return Err(duplicate_detection(job_id));
        }

        if let Some(job) = state.outstanding_job(job_id) {
            job.status = JobStatus::Success;
            job.detections_id = Some(detections_id.to_string());
        }
        state
            .detections
            .push((job_id.to_string(), content.to_string()));
        Ok(())
    }

    async fn commit_failure(
        &self,
        job_id: &str,
        status: JobStatus,
        execution_step: ExecutionStep,
        error_message: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push("commit_failure");
        if state.take_commit_fault() || state.fail_updates {
            return Err(storage_fault());
        }
        let Some(job) = state.outstanding_job(job_id) else {
            return Ok(());
        };

        job.status = status;
        job.detections_id = None;
        state.failures.push(JobFailure {
            job_id: job_id.to_string(),
            execution_step,
            error_message: error_message.to_string(),
        });
        Ok(())
    }
}

/// Scripted replies for [`FakeExecution`]
#[derive(Default)]
pub struct ExecutionState {
    pub statuses: HashMap<String, Result<ExecutionStatus, ExecutionError>>,
    pub files: HashMap<String, String>,
    pub submit_reply: Option<Result<String, ExecutionError>>,
    pub submissions: Vec<(String, serde_json::Value)>,
    pub polled: Vec<String>,
    pub fetched: Vec<String>,
}

#[derive(Default)]
pub struct FakeExecution {
    inner: Mutex<ExecutionState>,
}

impl FakeExecution {
    pub fn state(&self) -> MutexGuard<'_, ExecutionState> {
        self.inner.lock().unwrap()
    }

    pub fn accept_submissions_as(&self, job_id: &str) {
        self.state().submit_reply = Some(Ok(job_id.to_string()));
    }

    pub fn set_status(&self, job_id: &str, status: RemoteStatus) {
        self.state()
            .statuses
            .insert(job_id.to_string(), Ok(ExecutionStatus::new(status)));
    }

    pub fn set_reply(&self, job_id: &str, reply: Result<ExecutionStatus, ExecutionError>) {
        self.state().statuses.insert(job_id.to_string(), reply);
    }

    pub fn set_file(&self, data_id: &str, content: &str) {
        self.state()
            .files
            .insert(data_id.to_string(), content.to_string());
    }

    pub fn poll_count(&self, job_id: &str) -> usize {
        self.state().polled.iter().filter(|id| *id == job_id).count()
    }
}

#[async_trait]
impl ExecutionClient for FakeExecution {
    async fn submit(
        &self,
        service_id: &str,
        inputs: serde_json::Value,
    ) -> Result<String, ExecutionError> {
        let mut state = self.state();
        state.submissions.push((service_id.to_string(), inputs));
        state.submit_reply.clone().unwrap_or(Err(ExecutionError::ServerError {
            status: 503,
            body: "no reply scripted".to_string(),
        }))
    }

    async fn get_status(&self, job_id: &str) -> Result<ExecutionStatus, ExecutionError> {
        let mut state = self.state();
        state.polled.push(job_id.to_string());
        state
            .statuses
            .get(job_id)
            .cloned()
            .unwrap_or(Err(ExecutionError::NotFound))
    }

    async fn get_file(&self, data_id: &str) -> Result<String, ExecutionError> {
        let mut state = self.state();
        state.fetched.push(data_id.to_string());
        state
            .files
            .get(data_id)
            .cloned()
            .ok_or(ExecutionError::NotFound)
    }
}

/// Algorithm and scene lookups backed by maps
#[derive(Default)]
pub struct FakeCatalog {
    pub algorithms: HashMap<String, Algorithm>,
    pub scenes: HashMap<String, Scene>,
}

impl FakeCatalog {
    pub fn with(algorithm: Algorithm, scene: Scene) -> Self {
        let mut catalog = Self::default();
        catalog
            .algorithms
            .insert(algorithm.service_id.clone(), algorithm);
        catalog.scenes.insert(scene.id.clone(), scene);
        catalog
    }
}

#[async_trait]
impl AlgorithmCatalog for FakeCatalog {
    async fn get_algorithm(&self, algorithm_id: &str) -> Result<Algorithm, CatalogError> {
        self.algorithms
            .get(algorithm_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound {
                kind: "algorithm",
                id: algorithm_id.to_string(),
            })
    }
}

#[async_trait]
impl SceneCatalog for FakeCatalog {
    async fn get_scene(&self, scene_id: &str) -> Result<Scene, CatalogError> {
        self.scenes
            .get(scene_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound {
                kind: "scene",
                id: scene_id.to_string(),
            })
    }
}
