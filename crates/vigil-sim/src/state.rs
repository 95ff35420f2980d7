use std::sync::Arc;

use vigil_repo::MemoryConfigRepository;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<MemoryConfigRepository>,
    pub token: Option<String>,
}
