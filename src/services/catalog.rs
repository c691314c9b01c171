use async_trait::async_trait;

use crate::models::catalog::{Algorithm, Scene};

/// Resolves algorithm descriptors by service id.
#[async_trait]
pub trait AlgorithmCatalog: Send + Sync {
    async fn get_algorithm(&self, algorithm_id: &str) -> Result<Algorithm, CatalogError>;
}

/// Resolves scene descriptors by scene id.
#[async_trait]
pub trait SceneCatalog: Send + Sync {
    async fn get_scene(&self, scene_id: &str) -> Result<Scene, CatalogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}
