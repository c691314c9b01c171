use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool, Row};
use std::str::FromStr;

use crate::models::job::{ExecutionStep, Job, JobFailure, JobStatus, OutstandingJob};

fn non_terminal_statuses() -> Vec<&'static str> {
    JobStatus::NON_TERMINAL.iter().map(|s| s.as_str()).collect()
}

fn parse_status(raw: &str) -> Result<JobStatus, sqlx::Error> {
    JobStatus::from_str(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Insert a new job row
pub async fn insert_job(conn: &mut PgConnection, job: &Job) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO jobs (job_id, algorithm_name, algorithm_version, name, created_by,
                          created_on, scene_id, geometry, tide, tide_min_24h, tide_max_24h,
                          status, detections_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(&job.job_id)
    .bind(&job.algorithm_name)
    .bind(&job.algorithm_version)
    .bind(&job.name)
    .bind(&job.created_by)
    .bind(job.created_on)
    .bind(&job.scene_id)
    .bind(&job.geometry)
    .bind(job.tide)
    .bind(job.tide_min_24h)
    .bind(job.tide_max_24h)
    .bind(job.status.as_str())
    .bind(&job.detections_id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Associate a user with a job
pub async fn insert_job_user(
    conn: &mut PgConnection,
    job_id: &str,
    user_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO job_users (job_id, user_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(job_id)
    .bind(user_id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: &str) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT job_id, algorithm_name, algorithm_version, name, created_by, created_on,
               scene_id, geometry, tide, tide_min_24h, tide_max_24h, status, detections_id
        FROM jobs
        WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| -> Result<Job, sqlx::Error> {
        let status: String = r.try_get("status")?;
        Ok(Job {
            job_id: r.try_get("job_id")?,
            algorithm_name: r.try_get("algorithm_name")?,
            algorithm_version: r.try_get("algorithm_version")?,
            name: r.try_get("name")?,
            created_by: r.try_get("created_by")?,
            created_on: r.try_get("created_on")?,
            scene_id: r.try_get("scene_id")?,
            geometry: r.try_get("geometry")?,
            tide: r.try_get("tide")?,
            tide_min_24h: r.try_get("tide_min_24h")?,
            tide_max_24h: r.try_get("tide_max_24h")?,
            status: parse_status(&status)?,
            detections_id: r.try_get("detections_id")?,
        })
    })
    .transpose()
}

/// Jobs that have not reached a terminal status, oldest first
pub async fn select_outstanding_jobs(pool: &PgPool) -> Result<Vec<OutstandingJob>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT job_id, created_on, status
        FROM jobs
        WHERE status = ANY($1)
        ORDER BY created_on ASC
        "#,
    )
    .bind(non_terminal_statuses())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            let status: String = r.try_get("status")?;
            let created_on: DateTime<Utc> = r.try_get("created_on")?;
            Ok(OutstandingJob {
                job_id: r.try_get("job_id")?,
                created_on,
                status: parse_status(&status)?,
            })
        })
        .collect()
}

/// Update job status. Terminal jobs are never touched again.
pub async fn update_status(
    executor: impl PgExecutor<'_>,
    job_id: &str,
    status: JobStatus,
    detections_id: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = $1,
            detections_id = $2
        WHERE job_id = $3
          AND status = ANY($4)
        "#,
    )
    .bind(status.as_str())
    .bind(detections_id)
    .bind(job_id)
    .bind(non_terminal_statuses())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Record why a job failed
pub async fn insert_job_failure(
    executor: impl PgExecutor<'_>,
    job_id: &str,
    execution_step: ExecutionStep,
    error_message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO job_errors (job_id, execution_step, error_message)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(job_id)
    .bind(execution_step.as_str())
    .bind(error_message)
    .execute(executor)
    .await?;

    Ok(())
}

/// Get the recorded failure for a job, if any
pub async fn get_job_failure(pool: &PgPool, job_id: &str) -> Result<Option<JobFailure>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT job_id, execution_step, error_message
        FROM job_errors
        WHERE job_id = $1
        ORDER BY created_on DESC
        LIMIT 1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| -> Result<JobFailure, sqlx::Error> {
        let step: String = r.try_get("execution_step")?;
        Ok(JobFailure {
            job_id: r.try_get("job_id")?,
            execution_step: ExecutionStep::from_str(&step)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            error_message: r.try_get("error_message")?,
        })
    })
    .transpose()
}

/// Store the detection GeoJSON for a job
pub async fn insert_detection(
    executor: impl PgExecutor<'_>,
    job_id: &str,
    content: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO detections (job_id, feature_collection)
        VALUES ($1, $2::jsonb)
        "#,
    )
    .bind(job_id)
    .bind(content)
    .execute(executor)
    .await?;

    Ok(())
}

/// Count detection rows for a job
pub async fn count_detections(pool: &PgPool, job_id: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM detections WHERE job_id = $1")
        .bind(job_id)
        .fetch_one(pool)
        .await?;

    row.try_get("n")
}
