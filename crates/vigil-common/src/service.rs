use serde::{Deserialize, Serialize};

/// Catalog entry for an AI service that can be pinned to a GPU.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiService {
    /// Unique identity, e.g. `ai-llm`.
    pub name: String,
    pub display_name: String,
    pub vram_requirement_mb: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceHealth {
    Healthy,
    Degraded,
    Unhealthy,
    #[serde(other)]
    Unknown,
}

/// Restart progress reported while an apply is being rolled out.
/// `None` on the status record means no restart is in flight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RestartStatus {
    Pending,
    Restarting,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Live health projection of one service. Observed only, never written by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceHealthStatus {
    pub name: String,
    /// Container state (`running`, `stopped`, ...).
    pub status: String,
    pub health: ServiceHealth,

    #[serde(default)]
    pub gpu_index: Option<u32>,

    #[serde(default)]
    pub restart_status: Option<RestartStatus>,
}

impl ServiceHealthStatus {
    /// Healthy and not mid-restart.
    pub fn is_settled(&self) -> bool {
        self.health == ServiceHealth::Healthy && self.restart_status.is_none()
    }

    pub fn restart_failed(&self) -> bool {
        self.restart_status == Some(RestartStatus::Failed)
    }
}

/// True when every reported service is settled. An empty report has observed
/// nothing and does not count as converged.
pub fn all_settled(statuses: &[ServiceHealthStatus]) -> bool {
    !statuses.is_empty() && statuses.iter().all(ServiceHealthStatus::is_settled)
}
