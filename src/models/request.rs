use garde::Validate;
use serde::Deserialize;

/// Caller input for dispatching a new detection job.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[garde(length(min = 1, max = 256))]
    pub user_id: String,

    #[garde(length(min = 1, max = 256))]
    pub scene_id: String,

    #[garde(length(min = 1, max = 256))]
    pub algorithm_id: String,

    #[garde(length(min = 1, max = 100))]
    pub job_name: String,
}

impl CreateJobRequest {
    pub fn new(user_id: &str, scene_id: &str, algorithm_id: &str, job_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            scene_id: scene_id.to_string(),
            algorithm_id: algorithm_id.to_string(),
            job_name: job_name.trim().to_string(),
        }
    }
}
