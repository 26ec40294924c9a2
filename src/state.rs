use std::sync::Arc;

use crate::database::Repository;
use crate::services::{MemoryStore, SessionOrchestrator};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub memory: Arc<MemoryStore>,
    pub repository: Arc<Repository>,
}
