use beachfront_jobs::{
    app_state::AppState,
    config::AppConfig,
    db,
    services::{piazza::PiazzaClient, poller::WorkerExit},
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting job status worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Prometheus scrape endpoint
    let metrics_addr: SocketAddr = config
        .metrics_addr
        .parse()
        .expect("METRICS_ADDR must be a socket address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus exporter");
    describe_metrics();

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize execution platform client
    tracing::info!(piazza_url = %config.piazza_url, "Initializing Piazza client");
    let piazza = PiazzaClient::new(
        &config.piazza_url,
        &config.piazza_api_key,
        config.request_timeout(),
    )
    .expect("Failed to initialize Piazza client");

    let state = AppState::new(db_pool, piazza);
    let handle = state.status_worker(config.worker_settings()).start();

    let stopper = handle.stopper();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                stopper.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    match handle.join().await {
        WorkerExit::Stopped => ExitCode::SUCCESS,
        WorkerExit::Fatal {
            consecutive_failures,
        } => {
            tracing::error!(consecutive_failures, "Worker exited after repeated storage faults");
            ExitCode::FAILURE
        }
        WorkerExit::Panicked => ExitCode::FAILURE,
    }
}

fn describe_metrics() {
    metrics::describe_counter!("jobs_dispatched_total", "Jobs submitted and recorded");
    metrics::describe_counter!(
        "job_dispatch_failures_total",
        "Job dispatches that failed, by kind"
    );
    metrics::describe_counter!("job_polls_total", "Remote status polls issued");
    metrics::describe_counter!("job_poll_faults_total", "Remote status polls that failed, by kind");
    metrics::describe_counter!(
        "job_transitions_total",
        "Jobs moved to a terminal status, by status"
    );
    metrics::describe_counter!(
        "worker_storage_faults_total",
        "Worker cycles abandoned because storage failed"
    );
    metrics::describe_gauge!(
        "worker_outstanding_jobs",
        "Jobs listed as outstanding in the latest cycle"
    );
}
