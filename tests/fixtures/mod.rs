//! Sample catalog entries and jobs shared by the integration tests

#![allow(dead_code)]

use beachfront_jobs::models::catalog::{Algorithm, Scene};
use beachfront_jobs::models::job::{Job, JobStatus};
use chrono::{DateTime, TimeZone, Utc};

pub const ALGORITHM_ID: &str = "A1";
pub const SCENE_ID: &str = "S1";
pub const USER_ID: &str = "U1";

/// NDWI shoreline algorithm needing the coastal and swir1 bands
pub fn sample_algorithm() -> Algorithm {
    Algorithm {
        service_id: ALGORITHM_ID.to_string(),
        name: "BF_Algo_NDWI".to_string(),
        version: "0.1".to_string(),
        command: "shoreline --method=NDWI --threshold=0.0".to_string(),
        required_bands: vec!["coastal".to_string(), "swir1".to_string()],
        max_cloud_cover: Some(10.0),
    }
}

/// Landsat 8 scene carrying both bands the sample algorithm needs
pub fn sample_scene() -> Scene {
    Scene {
        id: SCENE_ID.to_string(),
        platform: "landsat".to_string(),
        captured_on: Utc.with_ymd_and_hms(2024, 3, 14, 10, 30, 0).unwrap(),
        geometry: serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[-48.0, -1.0], [-47.0, -1.0], [-47.0, 0.0], [-48.0, 0.0], [-48.0, -1.0]]]
        }),
        sensor_name: "OLI".to_string(),
        cloud_cover: Some(4.2),
        bands: [
            ("coastal", "https://scenes.example.com/S1/B1.TIF"),
            ("swir1", "https://scenes.example.com/S1/B6.TIF"),
            ("red", "https://scenes.example.com/S1/B4.TIF"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
        tide: Some(0.73),
        tide_min_24h: Some(-0.41),
        tide_max_24h: Some(1.12),
    }
}

/// A job as it looks right after dispatch
pub fn pending_job(job_id: &str, created_on: DateTime<Utc>) -> Job {
    let scene = sample_scene();
    Job {
        job_id: job_id.to_string(),
        algorithm_name: "BF_Algo_NDWI".to_string(),
        algorithm_version: "0.1".to_string(),
        name: format!("job {}", job_id),
        created_by: USER_ID.to_string(),
        created_on,
        scene_id: scene.id,
        geometry: scene.geometry,
        tide: scene.tide,
        tide_min_24h: scene.tide_min_24h,
        tide_max_24h: scene.tide_max_24h,
        status: JobStatus::Pending,
        detections_id: None,
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
}
