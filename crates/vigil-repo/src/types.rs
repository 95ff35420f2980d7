use async_trait::async_trait;
use thiserror::Error;

use vigil_common::{
    AiService, ApplyResult, DraftConfig, GpuConfig, GpuDevice, PreviewResult,
    ServiceHealthStatus, Strategy, UpdateConfigResult,
};

#[derive(Debug, Error)]
pub enum RepoError {
    /// Connection failures and transport timeouts.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl RepoError {
    /// The backend rejected the request itself; retrying the same input will not help.
    pub fn is_validation(&self) -> bool {
        match self {
            RepoError::Validation(_) => true,
            RepoError::Status { status, .. } => (400..500).contains(status),
            _ => false,
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Request/response boundary to the backend that owns GPU configuration.
///
/// Every change to persisted state flows through `update_config` and `apply_config`;
/// everything else is a read or an advisory computation.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn get_gpus(&self) -> RepoResult<Vec<GpuDevice>>;
    async fn get_services(&self) -> RepoResult<Vec<AiService>>;
    async fn get_config(&self) -> RepoResult<GpuConfig>;
    async fn get_service_health(&self) -> RepoResult<Vec<ServiceHealthStatus>>;

    /// Persist `{strategy, assignments}` without restarting anything.
    async fn update_config(&self, draft: &DraftConfig) -> RepoResult<UpdateConfigResult>;

    /// Restart every service whose effective assignment changed. May return before
    /// the restarts finish.
    async fn apply_config(&self) -> RepoResult<ApplyResult>;

    /// Rescan hardware and return the fresh inventory.
    async fn detect_gpus(&self) -> RepoResult<Vec<GpuDevice>>;

    /// Compute, without committing, the assignments `strategy` would produce.
    async fn preview_strategy(&self, strategy: Strategy) -> RepoResult<PreviewResult>;
}

#[async_trait]
impl<T: ConfigRepository + ?Sized> ConfigRepository for std::sync::Arc<T> {
    async fn get_gpus(&self) -> RepoResult<Vec<GpuDevice>> {
        (**self).get_gpus().await
    }

    async fn get_services(&self) -> RepoResult<Vec<AiService>> {
        (**self).get_services().await
    }

    async fn get_config(&self) -> RepoResult<GpuConfig> {
        (**self).get_config().await
    }

    async fn get_service_health(&self) -> RepoResult<Vec<ServiceHealthStatus>> {
        (**self).get_service_health().await
    }

    async fn update_config(&self, draft: &DraftConfig) -> RepoResult<UpdateConfigResult> {
        (**self).update_config(draft).await
    }

    async fn apply_config(&self) -> RepoResult<ApplyResult> {
        (**self).apply_config().await
    }

    async fn detect_gpus(&self) -> RepoResult<Vec<GpuDevice>> {
        (**self).detect_gpus().await
    }

    async fn preview_strategy(&self, strategy: Strategy) -> RepoResult<PreviewResult> {
        (**self).preview_strategy(strategy).await
    }
}
