use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::models::job::{ExecutionStep, Job, JobStatus, OutstandingJob};
use crate::services::persistence::{JobStore, StoreError};

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

pub mod queries;

/// Postgres-backed [`JobStore`].
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        queries::insert_job(&mut *tx, job).await?;
        queries::insert_job_user(&mut *tx, &job.job_id, &job.created_by).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn select_outstanding_jobs(&self) -> Result<Vec<OutstandingJob>, StoreError> {
        Ok(queries::select_outstanding_jobs(&self.pool).await?)
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        detections_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let updated = queries::update_status(&self.pool, job_id, status, detections_id).await?;
        if updated == 0 {
            warn_not_updated(job_id, status);
        }
        Ok(())
    }

    async fn insert_job_failure(
        &self,
        job_id: &str,
        execution_step: ExecutionStep,
        error_message: &str,
    ) -> Result<(), StoreError> {
        Ok(queries::insert_job_failure(&self.pool, job_id, execution_step, error_message).await?)
    }

    async fn insert_detection(&self, job_id: &str, content: &str) -> Result<(), StoreError> {
        Ok(queries::insert_detection(&self.pool, job_id, content).await?)
    }

    async fn commit_success(
        &self,
        job_id: &str,
        detections_id: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated =
            queries::update_status(&mut *tx, job_id, JobStatus::Success, Some(detections_id))
                .await?;
        if updated == 0 {
            warn_not_updated(job_id, JobStatus::Success);
            return Ok(());
        }
        queries::insert_detection(&mut *tx, job_id, content).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_failure(
        &self,
        job_id: &str,
        status: JobStatus,
        execution_step: ExecutionStep,
        error_message: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = queries::update_status(&mut *tx, job_id, status, None).await?;
        if updated == 0 {
            warn_not_updated(job_id, status);
            return Ok(());
        }
        queries::insert_job_failure(&mut *tx, job_id, execution_step, error_message).await?;
        tx.commit().await?;
        Ok(())
    }
}

fn warn_not_updated(job_id: &str, status: JobStatus) {
    tracing::warn!(job_id, status = %status, "Job already terminal or missing, status not changed");
}
