//! API shared state

use std::sync::Arc;

use crate::actors::evaluator::EvaluatorHandle;
use crate::storage::StorageBackend;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Backend for readings, thresholds and alerts
    pub storage: Arc<dyn StorageBackend>,

    /// Handle to the evaluator actor, notified after every committed reading
    pub evaluator: EvaluatorHandle,
}

impl ApiState {
    pub fn new(storage: Arc<dyn StorageBackend>, evaluator: EvaluatorHandle) -> Self {
        Self { storage, evaluator }
    }
}
