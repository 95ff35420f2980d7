//! Repositories for exercising the orchestrator in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use vigil_common::{
    AiService, ApplyResult, Assignment, DraftConfig, GpuConfig, GpuDevice, PreviewResult,
    RestartStatus, ServiceHealth, ServiceHealthStatus, Strategy, UpdateConfigResult,
};
use vigil_repo::{ConfigRepository, MemoryConfigRepository, RepoError, RepoResult};

pub fn gpus() -> Vec<GpuDevice> {
    vec![
        GpuDevice {
            index: 0,
            name: "RTX 4090".to_string(),
            vram_total_mb: 24_576,
            vram_used_mb: 2_048,
            compute_capability: Some("8.9".to_string()),
        },
        GpuDevice {
            index: 1,
            name: "RTX 3060".to_string(),
            vram_total_mb: 12_288,
            vram_used_mb: 1_024,
            compute_capability: Some("8.6".to_string()),
        },
    ]
}

pub fn services() -> Vec<AiService> {
    vec![
        AiService {
            name: "ai-llm".to_string(),
            display_name: "Nemotron LLM".to_string(),
            vram_requirement_mb: 14_000,
        },
        AiService {
            name: "ai-enrichment".to_string(),
            display_name: "Enrichment".to_string(),
            vram_requirement_mb: 3_500,
        },
    ]
}

pub fn fixture_repo() -> MemoryConfigRepository {
    MemoryConfigRepository::new(gpus(), services())
}

pub fn healthy(name: &str, gpu_index: u32) -> ServiceHealthStatus {
    ServiceHealthStatus {
        name: name.to_string(),
        status: "running".to_string(),
        health: ServiceHealth::Healthy,
        gpu_index: Some(gpu_index),
        restart_status: None,
    }
}

pub fn restarting(name: &str) -> ServiceHealthStatus {
    ServiceHealthStatus {
        name: name.to_string(),
        status: "restarting".to_string(),
        health: ServiceHealth::Unhealthy,
        gpu_index: None,
        restart_status: Some(RestartStatus::Restarting),
    }
}

pub fn restart_failed(name: &str) -> ServiceHealthStatus {
    ServiceHealthStatus {
        name: name.to_string(),
        status: "stopped".to_string(),
        health: ServiceHealth::Unhealthy,
        gpu_index: None,
        restart_status: Some(RestartStatus::Failed),
    }
}

/// One scripted health poll response.
pub enum Tick {
    Report(Vec<ServiceHealthStatus>),
    Error,
}

/// Backend whose health responses are scripted tick by tick. Once the script
/// runs out, the last report repeats forever.
pub struct ScriptedRepo {
    config: Mutex<GpuConfig>,
    script: Mutex<VecDeque<Tick>>,
    last_report: Mutex<Vec<ServiceHealthStatus>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub health_calls: AtomicU32,
    pub update_calls: AtomicU32,
    pub apply_calls: AtomicU32,
    fail_update: AtomicBool,
    fail_apply: AtomicBool,
    fail_previews: AtomicBool,
    apply_gate: Mutex<Option<Arc<Notify>>>,
    cancel_at: Mutex<Option<(u32, CancellationToken)>>,
    health_delay: Mutex<Option<Duration>>,
}

impl ScriptedRepo {
    pub fn new(initial: DraftConfig) -> Self {
        let config = GpuConfig {
            strategy: initial.strategy,
            assignments: initial.assignments,
            updated_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single(),
            strategies: Strategy::ALL.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            config: Mutex::new(config),
            script: Mutex::new(VecDeque::new()),
            last_report: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            health_calls: AtomicU32::new(0),
            update_calls: AtomicU32::new(0),
            apply_calls: AtomicU32::new(0),
            fail_update: AtomicBool::new(false),
            fail_apply: AtomicBool::new(false),
            fail_previews: AtomicBool::new(false),
            apply_gate: Mutex::new(None),
            cancel_at: Mutex::new(None),
            health_delay: Mutex::new(None),
        }
    }

    pub fn with_script(self, ticks: Vec<Tick>) -> Self {
        *self.script.lock().unwrap() = ticks.into();
        self
    }

    pub fn fail_update(&self, on: bool) {
        self.fail_update.store(on, Ordering::SeqCst);
    }

    pub fn fail_apply(&self, on: bool) {
        self.fail_apply.store(on, Ordering::SeqCst);
    }

    pub fn fail_previews(&self, on: bool) {
        self.fail_previews.store(on, Ordering::SeqCst);
    }

    /// Block `apply_config` until the returned notify is signalled.
    pub fn gate_apply(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.apply_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Cancel `token` from inside the `n`th health fetch (1-based).
    pub fn cancel_on_health_call(&self, n: u32, token: CancellationToken) {
        *self.cancel_at.lock().unwrap() = Some((n, token));
    }

    /// Make every health fetch take `delay` before answering.
    pub fn stall_health(&self, delay: Duration) {
        *self.health_delay.lock().unwrap() = Some(delay);
    }

    /// Simulate a write from another session.
    pub fn touch_externally(&self, assignments: Vec<Assignment>) {
        let mut cfg = self.config.lock().unwrap();
        cfg.assignments = assignments;
        cfg.updated_at = cfg.updated_at.map(|t| t + ChronoDuration::seconds(30));
    }

    pub fn persisted(&self) -> GpuConfig {
        self.config.lock().unwrap().clone()
    }

    pub fn call_log(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &'static str) {
        self.calls.lock().unwrap().push(op);
    }
}

fn unavailable() -> RepoError {
    RepoError::Status {
        status: 503,
        message: "backend unavailable".to_string(),
    }
}

#[async_trait]
impl ConfigRepository for ScriptedRepo {
    async fn get_gpus(&self) -> RepoResult<Vec<GpuDevice>> {
        Ok(gpus())
    }

    async fn get_services(&self) -> RepoResult<Vec<AiService>> {
        Ok(services())
    }

    async fn get_config(&self) -> RepoResult<GpuConfig> {
        self.record("get_config");
        Ok(self.persisted())
    }

    async fn get_service_health(&self) -> RepoResult<Vec<ServiceHealthStatus>> {
        self.record("get_service_health");
        let n = self.health_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = self.cancel_at.lock().unwrap().as_ref() {
            if *at == n {
                token.cancel();
            }
        }
        let delay = *self.health_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Tick::Report(statuses)) => {
                *self.last_report.lock().unwrap() = statuses.clone();
                Ok(statuses)
            }
            Some(Tick::Error) => Err(unavailable()),
            None => Ok(self.last_report.lock().unwrap().clone()),
        }
    }

    async fn update_config(&self, draft: &DraftConfig) -> RepoResult<UpdateConfigResult> {
        self.record("update_config");
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(RepoError::Validation("vram_budget_override must be positive".to_string()));
        }

        let known: Vec<u32> = gpus().iter().map(|g| g.index).collect();
        let warnings = draft
            .assignments
            .iter()
            .filter_map(|a| {
                let idx = a.gpu_index?;
                (!known.contains(&idx)).then(|| {
                    format!("service {} is assigned to GPU {idx}, which is not in the current inventory", a.service)
                })
            })
            .collect();

        let mut cfg = self.config.lock().unwrap();
        cfg.strategy = draft.strategy;
        cfg.assignments = draft.assignments.clone();
        cfg.updated_at = cfg.updated_at.map(|t| t + ChronoDuration::seconds(1));
        Ok(UpdateConfigResult {
            success: true,
            warnings,
        })
    }

    async fn apply_config(&self) -> RepoResult<ApplyResult> {
        self.record("apply_config");
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.apply_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let restarted = self
            .persisted()
            .assignments
            .iter()
            .map(|a| a.service.clone())
            .collect::<Vec<_>>();
        Ok(ApplyResult {
            success: true,
            warnings: Vec::new(),
            service_statuses: restarted.iter().map(|s| restarting(s)).collect(),
            restarted_services: restarted,
        })
    }

    async fn detect_gpus(&self) -> RepoResult<Vec<GpuDevice>> {
        Ok(gpus())
    }

    async fn preview_strategy(&self, strategy: Strategy) -> RepoResult<PreviewResult> {
        if self.fail_previews.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(PreviewResult {
            strategy,
            proposed_assignments: self.persisted().assignments,
        })
    }
}
