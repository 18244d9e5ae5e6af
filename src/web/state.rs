use std::sync::Arc;

use crate::orchestration::OrchestrationCore;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<OrchestrationCore>,
}

impl AppState {
    pub fn new(core: Arc<OrchestrationCore>) -> Self {
        Self { core }
    }
}
