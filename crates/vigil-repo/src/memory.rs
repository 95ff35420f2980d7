use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;

use vigil_common::{
    AiService, ApplyResult, Assignment, DraftConfig, GpuConfig, GpuDevice, PreviewResult,
    RestartStatus, ServiceHealth, ServiceHealthStatus, Strategy, UpdateConfigResult,
};

use crate::planner::{effective_budget_mb, resolve};
use crate::types::{ConfigRepository, RepoError, RepoResult};

/// In-process backend that implements the configuration contract against
/// simulated hardware and services.
///
/// Restarts triggered by `apply_config` progress one step per health read:
/// a restarted service reports `restarting` for `restart_ticks` reads and then
/// comes up healthy on its new GPU. A service pinned to a GPU missing from the
/// inventory reports a failed restart.
#[derive(Debug, Clone)]
pub struct MemoryConfigRepository {
    inner: Arc<RwLock<Inner>>,
    restart_ticks: u32,
}

#[derive(Debug)]
struct Inner {
    gpus: Vec<GpuDevice>,
    staged_gpus: Option<Vec<GpuDevice>>,
    services: Vec<AiService>,
    config: GpuConfig,
    running: BTreeMap<String, SimService>,
}

#[derive(Debug, Clone)]
struct SimService {
    gpu_index: Option<u32>,
    target: Option<u32>,
    remaining: u32,
    restart: Option<RestartStatus>,
}

impl SimService {
    fn health_status(&self, name: &str) -> ServiceHealthStatus {
        let (status, health) = match self.restart {
            Some(RestartStatus::Failed) => ("stopped", ServiceHealth::Unhealthy),
            Some(_) => ("restarting", ServiceHealth::Unhealthy),
            None => ("running", ServiceHealth::Healthy),
        };
        ServiceHealthStatus {
            name: name.to_string(),
            status: status.to_string(),
            health,
            gpu_index: self.gpu_index,
            restart_status: self.restart,
        }
    }

    /// Advance an in-flight restart by one observation.
    fn step(&mut self) {
        if self.restart != Some(RestartStatus::Restarting) {
            return;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.gpu_index = self.target;
            self.restart = None;
        }
    }
}

impl MemoryConfigRepository {
    /// Start with every service unassigned under the `manual` strategy.
    pub fn new(gpus: Vec<GpuDevice>, services: Vec<AiService>) -> Self {
        let assignments = services
            .iter()
            .map(|s| Assignment::unassigned(s.name.clone()))
            .collect();
        let running = services
            .iter()
            .map(|s| {
                (
                    s.name.clone(),
                    SimService {
                        gpu_index: None,
                        target: None,
                        remaining: 0,
                        restart: None,
                    },
                )
            })
            .collect();
        let config = GpuConfig {
            strategy: Strategy::Manual,
            assignments,
            updated_at: Some(Utc::now()),
            strategies: Strategy::ALL.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            inner: Arc::new(RwLock::new(Inner {
                gpus,
                staged_gpus: None,
                services,
                config,
                running,
            })),
            restart_ticks: 2,
        }
    }

    /// Number of health reads a restarted service spends in `restarting`.
    pub fn with_restart_ticks(mut self, ticks: u32) -> Self {
        self.restart_ticks = ticks;
        self
    }

    /// Hardware that the next `detect_gpus` call will discover.
    pub async fn stage_hardware(&self, gpus: Vec<GpuDevice>) {
        self.inner.write().await.staged_gpus = Some(gpus);
    }

    fn next_stamp(prev: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = Utc::now();
        match prev {
            Some(p) if now <= p => p + ChronoDuration::milliseconds(1),
            _ => now,
        }
    }

    fn validate(inner: &Inner, draft: &DraftConfig) -> RepoResult<()> {
        let known: HashSet<&str> = inner.services.iter().map(|s| s.name.as_str()).collect();
        let mut seen = HashSet::new();
        for a in &draft.assignments {
            if !known.contains(a.service.as_str()) {
                return Err(RepoError::Validation(format!("unknown service '{}'", a.service)));
            }
            if !seen.insert(a.service.as_str()) {
                return Err(RepoError::Validation(format!(
                    "service '{}' is assigned more than once",
                    a.service
                )));
            }
            if a.vram_budget_override == Some(0) {
                return Err(RepoError::Validation(format!(
                    "service '{}' has a zero VRAM budget override",
                    a.service
                )));
            }
        }
        Ok(())
    }

    fn capacity_warnings(inner: &Inner, assignments: &[Assignment]) -> Vec<String> {
        let mut warnings = Vec::new();
        for a in assignments {
            let Some(gpu_index) = a.gpu_index else {
                continue;
            };
            let Some(gpu) = inner.gpus.iter().find(|g| g.index == gpu_index) else {
                warnings.push(format!(
                    "service {} is assigned to GPU {}, which is not in the current inventory",
                    a.service, gpu_index
                ));
                continue;
            };
            let Some(service) = inner.services.iter().find(|s| s.name == a.service) else {
                continue;
            };
            let budget = effective_budget_mb(service, assignments);
            if budget > gpu.vram_free_mb() {
                warnings.push(format!(
                    "service {}'s VRAM budget ({} MB) exceeds free VRAM on GPU {} ({} MB)",
                    a.service,
                    budget,
                    gpu_index,
                    gpu.vram_free_mb()
                ));
            }
        }
        warnings
    }
}

#[async_trait]
impl ConfigRepository for MemoryConfigRepository {
    async fn get_gpus(&self) -> RepoResult<Vec<GpuDevice>> {
        Ok(self.inner.read().await.gpus.clone())
    }

    async fn get_services(&self) -> RepoResult<Vec<AiService>> {
        Ok(self.inner.read().await.services.clone())
    }

    async fn get_config(&self) -> RepoResult<GpuConfig> {
        Ok(self.inner.read().await.config.clone())
    }

    async fn get_service_health(&self) -> RepoResult<Vec<ServiceHealthStatus>> {
        let mut inner = self.inner.write().await;
        let mut out = Vec::with_capacity(inner.running.len());
        for (name, svc) in inner.running.iter_mut() {
            svc.step();
            out.push(svc.health_status(name));
        }
        Ok(out)
    }

    async fn update_config(&self, draft: &DraftConfig) -> RepoResult<UpdateConfigResult> {
        let mut inner = self.inner.write().await;
        Self::validate(&inner, draft)?;

        // one assignment per known service, in catalog order
        let assignments: Vec<Assignment> = inner
            .services
            .iter()
            .map(|s| {
                draft
                    .assignment(&s.name)
                    .cloned()
                    .unwrap_or_else(|| Assignment::unassigned(s.name.clone()))
            })
            .collect();

        let warnings = Self::capacity_warnings(&inner, &assignments);
        let stamp = Self::next_stamp(inner.config.updated_at);
        inner.config.strategy = draft.strategy;
        inner.config.assignments = assignments;
        inner.config.updated_at = Some(stamp);

        tracing::info!(strategy = %draft.strategy, warnings = warnings.len(), "stored gpu config");
        Ok(UpdateConfigResult {
            success: true,
            warnings,
        })
    }

    async fn apply_config(&self) -> RepoResult<ApplyResult> {
        let mut inner = self.inner.write().await;
        let effective = resolve(
            inner.config.strategy,
            &inner.gpus,
            &inner.services,
            &inner.config.assignments,
        );
        let warnings = Self::capacity_warnings(&inner, &effective);
        let inventory: HashSet<u32> = inner.gpus.iter().map(|g| g.index).collect();
        let restart_ticks = self.restart_ticks;

        let mut restarted = Vec::new();
        for a in &effective {
            let Some(svc) = inner.running.get_mut(&a.service) else {
                continue;
            };
            let current = if svc.restart.is_some() { svc.target } else { svc.gpu_index };
            if current == a.gpu_index && svc.restart != Some(RestartStatus::Failed) {
                continue;
            }
            restarted.push(a.service.clone());
            svc.target = a.gpu_index;
            match a.gpu_index {
                Some(idx) if !inventory.contains(&idx) => {
                    svc.restart = Some(RestartStatus::Failed);
                    svc.remaining = 0;
                }
                _ if restart_ticks == 0 => {
                    svc.gpu_index = a.gpu_index;
                    svc.restart = None;
                    svc.remaining = 0;
                }
                _ => {
                    svc.restart = Some(RestartStatus::Restarting);
                    svc.remaining = restart_ticks;
                }
            }
        }

        let service_statuses = inner
            .running
            .iter()
            .map(|(name, svc)| svc.health_status(name))
            .collect();

        tracing::info!(restarted = ?restarted, "triggered service restarts");
        Ok(ApplyResult {
            success: true,
            warnings,
            restarted_services: restarted,
            service_statuses,
        })
    }

    async fn detect_gpus(&self) -> RepoResult<Vec<GpuDevice>> {
        let mut inner = self.inner.write().await;
        if let Some(staged) = inner.staged_gpus.take() {
            tracing::info!(count = staged.len(), "hardware rescan found new inventory");
            inner.gpus = staged;
        }
        Ok(inner.gpus.clone())
    }

    async fn preview_strategy(&self, strategy: Strategy) -> RepoResult<PreviewResult> {
        let inner = self.inner.read().await;
        let proposed = resolve(strategy, &inner.gpus, &inner.services, &inner.config.assignments);
        Ok(PreviewResult {
            strategy,
            proposed_assignments: proposed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> MemoryConfigRepository {
        let gpus = vec![
            GpuDevice {
                index: 0,
                name: "RTX 4090".to_string(),
                vram_total_mb: 24_576,
                vram_used_mb: 0,
                compute_capability: Some("8.9".to_string()),
            },
            GpuDevice {
                index: 1,
                name: "RTX 3060".to_string(),
                vram_total_mb: 12_288,
                vram_used_mb: 0,
                compute_capability: Some("8.6".to_string()),
            },
        ];
        let services = vec![
            AiService {
                name: "ai-llm".to_string(),
                display_name: "LLM".to_string(),
                vram_requirement_mb: 16_000,
            },
            AiService {
                name: "ai-enrichment".to_string(),
                display_name: "Enrichment".to_string(),
                vram_requirement_mb: 4_000,
            },
        ];
        MemoryConfigRepository::new(gpus, services)
    }

    fn manual(assignments: Vec<Assignment>) -> DraftConfig {
        DraftConfig {
            strategy: Strategy::Manual,
            assignments,
        }
    }

    #[tokio::test]
    async fn test_update_fills_missing_services_and_bumps_stamp() {
        let repo = fixture();
        let before = repo.get_config().await.unwrap();

        let res = repo
            .update_config(&manual(vec![Assignment::pinned("ai-llm", 0)]))
            .await
            .unwrap();
        assert!(res.success);
        assert!(res.warnings.is_empty());

        let after = repo.get_config().await.unwrap();
        assert_eq!(after.assignments.len(), 2);
        assert_eq!(after.assignments[1], Assignment::unassigned("ai-enrichment"));
        assert!(after.updated_at > before.updated_at);
    }

    #[tokio::test]
    async fn test_update_warns_on_missing_gpu_and_overcommit() {
        let repo = fixture();
        let res = repo
            .update_config(&manual(vec![
                Assignment::pinned("ai-llm", 5),
                Assignment {
                    service: "ai-enrichment".to_string(),
                    gpu_index: Some(1),
                    vram_budget_override: Some(20_000),
                },
            ]))
            .await
            .unwrap();
        assert!(res.success);
        assert_eq!(res.warnings.len(), 2);
        assert!(res.warnings[0].contains("GPU 5"));
        assert!(res.warnings[1].contains("exceeds free VRAM"));
    }

    #[tokio::test]
    async fn test_update_rejects_duplicates_and_unknown() {
        let repo = fixture();
        let dup = manual(vec![Assignment::pinned("ai-llm", 0), Assignment::pinned("ai-llm", 1)]);
        assert!(repo.update_config(&dup).await.unwrap_err().is_validation());

        let unknown = manual(vec![Assignment::pinned("ai-ocr", 0)]);
        assert!(repo.update_config(&unknown).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_apply_restarts_then_converges() {
        let repo = fixture().with_restart_ticks(2);
        repo.update_config(&manual(vec![
            Assignment::pinned("ai-llm", 0),
            Assignment::pinned("ai-enrichment", 1),
        ]))
        .await
        .unwrap();

        let res = repo.apply_config().await.unwrap();
        assert!(res.success);
        let mut restarted = res.restarted_services.clone();
        restarted.sort();
        assert_eq!(restarted, vec!["ai-enrichment", "ai-llm"]);

        let first = repo.get_service_health().await.unwrap();
        assert!(first.iter().all(|s| s.restart_status == Some(RestartStatus::Restarting)));

        let second = repo.get_service_health().await.unwrap();
        assert!(vigil_common::all_settled(&second));
        let llm = second.iter().find(|s| s.name == "ai-llm").unwrap();
        assert_eq!(llm.gpu_index, Some(0));

        // nothing changed since, so a second apply is a no-op
        let again = repo.apply_config().await.unwrap();
        assert!(again.restarted_services.is_empty());
    }

    #[tokio::test]
    async fn test_apply_to_missing_gpu_fails_restart() {
        let repo = fixture();
        repo.update_config(&manual(vec![Assignment::pinned("ai-llm", 7)]))
            .await
            .unwrap();
        let res = repo.apply_config().await.unwrap();
        assert_eq!(res.restarted_services, vec!["ai-llm"]);

        let health = repo.get_service_health().await.unwrap();
        let llm = health.iter().find(|s| s.name == "ai-llm").unwrap();
        assert!(llm.restart_failed());
    }

    #[tokio::test]
    async fn test_preview_does_not_persist() {
        let repo = fixture();
        let before = repo.get_config().await.unwrap();
        let preview = repo.preview_strategy(Strategy::Balanced).await.unwrap();
        assert_eq!(preview.strategy, Strategy::Balanced);
        assert_eq!(preview.proposed_assignments.len(), 2);
        assert!(preview.proposed_assignments.iter().all(|a| a.gpu_index.is_some()));
        assert_eq!(repo.get_config().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_detect_swaps_in_staged_hardware() {
        let repo = fixture();
        assert_eq!(repo.detect_gpus().await.unwrap().len(), 2);

        repo.stage_hardware(vec![GpuDevice {
            index: 0,
            name: "L4".to_string(),
            vram_total_mb: 23_034,
            vram_used_mb: 512,
            compute_capability: None,
        }])
        .await;
        let gpus = repo.detect_gpus().await.unwrap();
        assert_eq!(gpus.len(), 1);
        assert_eq!(repo.get_gpus().await.unwrap(), gpus);
    }
}
