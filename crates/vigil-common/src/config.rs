use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Policy the backend uses to compute GPU assignments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Assignments are whatever the user pinned.
    #[default]
    Manual,
    VramBased,
    LatencyOptimized,
    IsolationFirst,
    Balanced,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Manual,
        Strategy::VramBased,
        Strategy::LatencyOptimized,
        Strategy::IsolationFirst,
        Strategy::Balanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Manual => "manual",
            Strategy::VramBased => "vram_based",
            Strategy::LatencyOptimized => "latency_optimized",
            Strategy::IsolationFirst => "isolation_first",
            Strategy::Balanced => "balanced",
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Strategy::Manual)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown strategy '{}', available: manual, vram_based, latency_optimized, isolation_first, balanced",
                    s
                )
            })
    }
}

/// Binding of one service to a GPU.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    /// References `AiService::name`; unique within an assignment list.
    pub service: String,

    /// `None` means unassigned.
    #[serde(default)]
    pub gpu_index: Option<u32>,

    /// Overrides the service's default VRAM requirement for capacity checks.
    #[serde(default)]
    pub vram_budget_override: Option<u64>,
}

impl Assignment {
    pub fn unassigned(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            gpu_index: None,
            vram_budget_override: None,
        }
    }

    pub fn pinned(service: impl Into<String>, gpu_index: u32) -> Self {
        Self {
            service: service.into(),
            gpu_index: Some(gpu_index),
            vram_budget_override: None,
        }
    }
}

/// Persisted assignment configuration, owned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GpuConfig {
    pub strategy: Strategy,

    #[serde(default)]
    pub assignments: Vec<Assignment>,

    /// Server stamp of the last write; used to detect changes made by other sessions.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    /// Strategies the backend currently supports (informational).
    #[serde(default)]
    pub strategies: Vec<String>,
}

impl GpuConfig {
    pub fn to_draft(&self) -> DraftConfig {
        DraftConfig {
            strategy: self.strategy,
            assignments: self.assignments.clone(),
        }
    }
}

/// Client-side editable mirror of `{strategy, assignments}`; also the body of a config update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftConfig {
    pub strategy: Strategy,
    pub assignments: Vec<Assignment>,
}

impl DraftConfig {
    pub fn assignment(&self, service: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.service == service)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateConfigResult {
    pub success: bool,

    /// Non-fatal advisories, e.g. an assignment to a GPU missing from the inventory.
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_names() {
        for st in Strategy::ALL {
            let json = serde_json::to_string(&st).unwrap();
            assert_eq!(json, format!("\"{}\"", st.as_str()));
            assert_eq!(st.as_str().parse::<Strategy>().unwrap(), st);
        }
        assert!("round_robin".parse::<Strategy>().is_err());
        assert!(Strategy::Manual.is_manual());
        assert!(!Strategy::Balanced.is_manual());
    }

    #[test]
    fn test_config_defaults() {
        let cfg: GpuConfig = serde_json::from_str(r#"{"strategy":"vram_based"}"#).unwrap();
        assert_eq!(cfg.strategy, Strategy::VramBased);
        assert!(cfg.assignments.is_empty());
        assert!(cfg.updated_at.is_none());
        assert!(cfg.strategies.is_empty());
    }

    #[test]
    fn test_to_draft() {
        let cfg = GpuConfig {
            strategy: Strategy::Manual,
            assignments: vec![Assignment::pinned("ai-llm", 0), Assignment::unassigned("ai-face")],
            updated_at: None,
            strategies: vec!["manual".to_string()],
        };
        let draft = cfg.to_draft();
        assert_eq!(draft.strategy, Strategy::Manual);
        assert_eq!(draft.assignment("ai-llm").and_then(|a| a.gpu_index), Some(0));
        assert_eq!(draft.assignment("ai-face").and_then(|a| a.gpu_index), None);
        assert!(draft.assignment("ai-ocr").is_none());
    }
}
