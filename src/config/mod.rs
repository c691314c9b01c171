use serde::Deserialize;
use std::time::Duration;

use crate::services::poller::WorkerSettings;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Base URL of the Piazza execution gateway
    pub piazza_url: String,

    /// Piazza API key, sent as the basic-auth username
    pub piazza_api_key: String,

    /// Seconds between worker cycles
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum age in seconds of a job that has not finished
    #[serde(default = "default_job_ttl_secs")]
    pub job_ttl_secs: u64,

    /// Sleep increment in seconds; bounds shutdown latency
    #[serde(default = "default_sleep_slice_secs")]
    pub sleep_slice_secs: u64,

    /// Timeout applied to every call to the execution platform
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Consecutive storage faults tolerated before the worker stops
    #[serde(default = "default_max_storage_failures")]
    pub max_storage_failures: u32,

    /// Prometheus scrape address for the worker (e.g., "0.0.0.0:9100")
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_job_ttl_secs() -> u64 {
    2 * 60 * 60
}

fn default_sleep_slice_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_storage_failures() -> u32 {
    3
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            interval: Duration::from_secs(self.poll_interval_secs),
            job_ttl: Duration::from_secs(self.job_ttl_secs),
            sleep_slice: Duration::from_secs(self.sleep_slice_secs),
            max_storage_failures: self.max_storage_failures,
        }
    }
}
