use chrono::Utc;
use garde::Validate;
use std::sync::Arc;

use crate::models::catalog::{Algorithm, Scene};
use crate::models::job::{Job, JobStatus};
use crate::models::request::CreateJobRequest;
use crate::services::catalog::{AlgorithmCatalog, SceneCatalog};
use crate::services::execution::{ExecutionClient, ExecutionError};
use crate::services::persistence::{JobStore, StoreError};

/// File name the algorithm writes its detections to.
pub const OUTPUT_FILENAME: &str = "shoreline.geojson";

/// Validates prerequisites, submits jobs to the execution platform and
/// records them locally.
pub struct JobDispatcher {
    algorithms: Arc<dyn AlgorithmCatalog>,
    scenes: Arc<dyn SceneCatalog>,
    execution: Arc<dyn ExecutionClient>,
    store: Arc<dyn JobStore>,
}

impl JobDispatcher {
    pub fn new(
        algorithms: Arc<dyn AlgorithmCatalog>,
        scenes: Arc<dyn SceneCatalog>,
        execution: Arc<dyn ExecutionClient>,
        store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            algorithms,
            scenes,
            execution,
            store,
        }
    }

    /// Dispatch a new job.
    ///
    /// Nothing is submitted or persisted unless both the algorithm and the
    /// scene resolve. Nothing is persisted unless submission succeeds.
    pub async fn create(
        &self,
        user_id: &str,
        scene_id: &str,
        algorithm_id: &str,
        job_name: &str,
    ) -> Result<Job, DispatchError> {
        let request = CreateJobRequest::new(user_id, scene_id, algorithm_id, job_name);
        let result = self.dispatch(&request).await;

        match &result {
            Ok(job) => {
                metrics::counter!("jobs_dispatched_total").increment(1);
                tracing::info!(
                    job_id = %job.job_id,
                    user_id = %job.created_by,
                    scene_id = %job.scene_id,
                    algorithm = %job.algorithm_name,
                    "Job dispatched"
                );
            }
            Err(e) => {
                metrics::counter!("job_dispatch_failures_total", "kind" => e.kind())
                    .increment(1);
                tracing::warn!(
                    user_id = %request.user_id,
                    scene_id = %request.scene_id,
                    algorithm_id = %request.algorithm_id,
                    error = %e,
                    "Job dispatch failed"
                );
            }
        }

        result
    }

    async fn dispatch(&self, request: &CreateJobRequest) -> Result<Job, DispatchError> {
        request
            .validate()
            .map_err(|e| DispatchError::Preprocessing(format!("Invalid job request: {}", e)))?;

        let algorithm = self
            .algorithms
            .get_algorithm(&request.algorithm_id)
            .await
            .map_err(|e| {
                DispatchError::Preprocessing(format!("Could not resolve algorithm: {}", e))
            })?;

        let scene = self
            .scenes
            .get_scene(&request.scene_id)
            .await
            .map_err(|e| DispatchError::Preprocessing(format!("Could not resolve scene: {}", e)))?;

        check_cloud_cover(&algorithm, &scene)?;
        let inputs = build_inputs(&algorithm, &scene, &request.user_id)?;

        tracing::debug!(
            service_id = %algorithm.service_id,
            scene_id = %scene.id,
            "Submitting job to execution platform"
        );
        let job_id = self.execution.submit(&algorithm.service_id, inputs).await?;

        let job = Job {
            job_id,
            algorithm_name: algorithm.name,
            algorithm_version: algorithm.version,
            name: request.job_name.clone(),
            created_by: request.user_id.clone(),
            created_on: Utc::now(),
            scene_id: scene.id,
            geometry: scene.geometry,
            tide: scene.tide,
            tide_min_24h: scene.tide_min_24h,
            tide_max_24h: scene.tide_max_24h,
            status: JobStatus::Pending,
            detections_id: None,
        };

        if let Err(e) = self.store.insert_job(&job).await {
            tracing::error!(
                job_id = %job.job_id,
                error = %e,
                "Remote job submitted but could not be recorded locally"
            );
            return Err(DispatchError::Persistence(e));
        }

        Ok(job)
    }
}

fn check_cloud_cover(algorithm: &Algorithm, scene: &Scene) -> Result<(), DispatchError> {
    match (algorithm.max_cloud_cover, scene.cloud_cover) {
        (Some(max), Some(cover)) if cover > max => Err(DispatchError::Preprocessing(format!(
            "Scene {} cloud cover {}% exceeds the {}% allowed by {}",
            scene.id, cover, max, algorithm.name
        ))),
        _ => Ok(()),
    }
}

/// Build the execution payload from the algorithm's required bands and the
/// scene's matching resources.
pub fn build_inputs(
    algorithm: &Algorithm,
    scene: &Scene,
    user_id: &str,
) -> Result<serde_json::Value, DispatchError> {
    let mut files = Vec::with_capacity(algorithm.required_bands.len());
    let mut names = Vec::with_capacity(algorithm.required_bands.len());

    for band in &algorithm.required_bands {
        let url = scene.bands.get(band).ok_or_else(|| {
            DispatchError::Preprocessing(format!(
                "Scene {} is missing required band '{}'",
                scene.id, band
            ))
        })?;
        files.push(url.clone());
        names.push(format!("{}.TIF", band));
    }

    let content = serde_json::json!({
        "cmd": algorithm.command,
        "inExtFiles": files,
        "inExtNames": names,
        "outGeoJson": [OUTPUT_FILENAME],
        "userID": user_id,
    });

    Ok(serde_json::json!({
        "body": {
            "content": content.to_string(),
            "type": "body",
            "mimeType": "application/json",
        }
    }))
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Preprocessing error: {0}")]
    Preprocessing(String),

    #[error("Submission error: {0}")]
    Submission(#[from] ExecutionError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Preprocessing(_) => "preprocessing",
            DispatchError::Submission(_) => "submission",
            DispatchError::Persistence(_) => "persistence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn algorithm(bands: &[&str]) -> Algorithm {
        Algorithm {
            service_id: "svc-1".to_string(),
            name: "BF_Algo_NDWI".to_string(),
            version: "0.1".to_string(),
            command: "shoreline --method=NDWI".to_string(),
            required_bands: bands.iter().map(|b| b.to_string()).collect(),
            max_cloud_cover: None,
        }
    }

    fn scene(bands: &[(&str, &str)]) -> Scene {
        Scene {
            id: "landsat:LC80".to_string(),
            platform: "landsat".to_string(),
            captured_on: Utc::now(),
            geometry: serde_json::json!({"type": "Point", "coordinates": [0.0, 0.0]}),
            sensor_name: "OLI".to_string(),
            cloud_cover: Some(3.0),
            bands: bands
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            tide: None,
            tide_min_24h: None,
            tide_max_24h: None,
        }
    }

    #[test]
    fn test_inputs_follow_required_band_order() {
        let inputs = build_inputs(
            &algorithm(&["swir1", "coastal"]),
            &scene(&[("coastal", "http://c"), ("swir1", "http://s")]),
            "user-1",
        )
        .unwrap();

        let content: serde_json::Value =
            serde_json::from_str(inputs["body"]["content"].as_str().unwrap()).unwrap();
        assert_eq!(content["inExtFiles"], serde_json::json!(["http://s", "http://c"]));
        assert_eq!(content["inExtNames"], serde_json::json!(["swir1.TIF", "coastal.TIF"]));
        assert_eq!(content["outGeoJson"], serde_json::json!([OUTPUT_FILENAME]));
        assert_eq!(content["userID"], "user-1");
    }

    #[test]
    fn test_missing_band_is_preprocessing_error() {
        let err = build_inputs(
            &algorithm(&["coastal", "swir1"]),
            &scene(&[("coastal", "http://c")]),
            "user-1",
        )
        .unwrap_err();

        assert!(matches!(err, DispatchError::Preprocessing(ref m) if m.contains("swir1")));
    }

    #[test]
    fn test_cloud_cover_limit() {
        let mut algorithm = algorithm(&["coastal"]);
        let mut scene = scene(&[("coastal", "http://c")]);
        assert!(check_cloud_cover(&algorithm, &scene).is_ok());

        algorithm.max_cloud_cover = Some(3.0);
        assert!(check_cloud_cover(&algorithm, &scene).is_ok());

        scene.cloud_cover = Some(3.5);
        let err = check_cloud_cover(&algorithm, &scene).unwrap_err();
        assert!(matches!(err, DispatchError::Preprocessing(ref m) if m.contains("3.5%")));

        // Unknown cover is not held against the scene.
        scene.cloud_cover = None;
        assert!(check_cloud_cover(&algorithm, &scene).is_ok());
    }
}
