use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Algorithm registered as a service on the execution platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Algorithm {
    pub service_id: String,
    pub name: String,
    pub version: String,
    /// Command line the service runs; input files are appended by the dispatcher.
    pub command: String,
    /// Scene bands the algorithm consumes, in the order it expects them.
    pub required_bands: Vec<String>,
    /// Scenes cloudier than this percentage are rejected.
    pub max_cloud_cover: Option<f64>,
}

/// Imagery scene as described by the scene catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scene {
    pub id: String,
    pub platform: String,
    pub captured_on: DateTime<Utc>,
    /// GeoJSON footprint, carried through to the job untouched.
    pub geometry: serde_json::Value,
    pub sensor_name: String,
    pub cloud_cover: Option<f64>,
    /// Band name to downloadable resource URL.
    pub bands: HashMap<String, String>,
    pub tide: Option<f64>,
    pub tide_min_24h: Option<f64>,
    pub tide_max_24h: Option<f64>,
}
