use serde::{Deserialize, Serialize};

use crate::config::{Assignment, Strategy};
use crate::service::ServiceHealthStatus;

/// Terminal snapshot of an apply: either the backend's trigger response or
/// the orchestrator's final report after polling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ApplyResult {
    pub success: bool,

    #[serde(default)]
    pub warnings: Vec<String>,

    #[serde(default)]
    pub restarted_services: Vec<String>,

    #[serde(default)]
    pub service_statuses: Vec<ServiceHealthStatus>,
}

/// Assignments a strategy would produce. Advisory only, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreviewResult {
    pub strategy: Strategy,
    pub proposed_assignments: Vec<Assignment>,
}
