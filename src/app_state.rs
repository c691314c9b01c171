use sqlx::PgPool;
use std::sync::Arc;

use crate::db::PgJobStore;
use crate::services::{
    catalog::{AlgorithmCatalog, SceneCatalog},
    dispatcher::JobDispatcher,
    execution::ExecutionClient,
    persistence::JobStore,
    piazza::PiazzaClient,
    poller::{StatusWorker, WorkerSettings},
};

/// Shared collaborators for the dispatcher and the status worker.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub execution: Arc<dyn ExecutionClient>,
    pub algorithms: Arc<dyn AlgorithmCatalog>,
}

impl AppState {
    pub fn new(db: PgPool, piazza: PiazzaClient) -> Self {
        let piazza = Arc::new(piazza);
        Self {
            store: Arc::new(PgJobStore::new(db)),
            execution: piazza.clone(),
            algorithms: piazza,
        }
    }

    /// Build a dispatcher using the given scene catalog.
    pub fn dispatcher(&self, scenes: Arc<dyn SceneCatalog>) -> JobDispatcher {
        JobDispatcher::new(
            self.algorithms.clone(),
            scenes,
            self.execution.clone(),
            self.store.clone(),
        )
    }

    pub fn status_worker(&self, settings: WorkerSettings) -> StatusWorker {
        StatusWorker::new(self.store.clone(), self.execution.clone(), settings)
    }
}
