//! Assignment planners used by the in-memory backend to answer previews and to
//! resolve non-manual strategies on apply. They are placement heuristics over the
//! reported inventory, not a hardware-aware scheduler.

use std::collections::HashMap;

use vigil_common::{AiService, Assignment, GpuDevice, Strategy};

/// Trait for pluggable assignment strategies.
pub trait PlacementStrategy: Send + Sync {
    /// Produce one assignment per service, in catalog order.
    fn plan(&self, gpus: &[GpuDevice], services: &[AiService], current: &[Assignment]) -> Vec<Assignment>;

    fn name(&self) -> &'static str;
}

/// VRAM budget used for capacity decisions: the override if set, else the catalog requirement.
pub fn effective_budget_mb(service: &AiService, current: &[Assignment]) -> u64 {
    current
        .iter()
        .find(|a| a.service == service.name)
        .and_then(|a| a.vram_budget_override)
        .unwrap_or(service.vram_requirement_mb)
}

/// Running per-GPU bookkeeping shared by the planners.
struct Ledger {
    free: HashMap<u32, u64>,
    load: HashMap<u32, u64>,
    tenants: HashMap<u32, u32>,
}

impl Ledger {
    fn new(gpus: &[GpuDevice]) -> Self {
        Self {
            free: gpus.iter().map(|g| (g.index, g.vram_free_mb())).collect(),
            load: gpus.iter().map(|g| (g.index, 0)).collect(),
            tenants: gpus.iter().map(|g| (g.index, 0)).collect(),
        }
    }

    fn place(&mut self, gpu_index: u32, budget: u64) {
        if let Some(free) = self.free.get_mut(&gpu_index) {
            *free = free.saturating_sub(budget);
        }
        *self.load.entry(gpu_index).or_default() += budget;
        *self.tenants.entry(gpu_index).or_default() += 1;
    }

    /// GPU with the most free VRAM that still fits `budget`, falling back to the most free overall.
    fn best_fit(&self, gpus: &[GpuDevice], budget: u64) -> Option<u32> {
        let free = |g: &&GpuDevice| self.free.get(&g.index).copied().unwrap_or(0);
        gpus.iter()
            .filter(|g| free(g) >= budget)
            .max_by_key(|g| (free(g), std::cmp::Reverse(g.index)))
            .or_else(|| gpus.iter().max_by_key(|g| (free(g), std::cmp::Reverse(g.index))))
            .map(|g| g.index)
    }
}

/// Services ordered heaviest first; ties keep catalog order.
fn by_budget_desc<'a>(services: &'a [AiService], current: &[Assignment]) -> Vec<(&'a AiService, u64)> {
    let mut out: Vec<(&AiService, u64)> = services
        .iter()
        .map(|s| (s, effective_budget_mb(s, current)))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1));
    out
}

/// Emit assignments in catalog order, keeping any budget overrides from `current`.
fn emit(services: &[AiService], current: &[Assignment], chosen: &HashMap<String, u32>) -> Vec<Assignment> {
    services
        .iter()
        .map(|s| Assignment {
            service: s.name.clone(),
            gpu_index: chosen.get(&s.name).copied(),
            vram_budget_override: current
                .iter()
                .find(|a| a.service == s.name)
                .and_then(|a| a.vram_budget_override),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// VramBased: heaviest service first onto the GPU with the most free VRAM
// ---------------------------------------------------------------------------

pub struct VramBased;

impl PlacementStrategy for VramBased {
    fn plan(&self, gpus: &[GpuDevice], services: &[AiService], current: &[Assignment]) -> Vec<Assignment> {
        let mut ledger = Ledger::new(gpus);
        let mut chosen = HashMap::new();
        for (svc, budget) in by_budget_desc(services, current) {
            if let Some(idx) = ledger.best_fit(gpus, budget) {
                ledger.place(idx, budget);
                chosen.insert(svc.name.clone(), idx);
            }
        }
        emit(services, current, &chosen)
    }

    fn name(&self) -> &'static str {
        "vram_based"
    }
}

// ---------------------------------------------------------------------------
// LatencyOptimized: the heaviest service gets the largest GPU to itself,
// everything else is packed onto the remaining GPUs.
// ---------------------------------------------------------------------------

pub struct LatencyOptimized;

impl PlacementStrategy for LatencyOptimized {
    fn plan(&self, gpus: &[GpuDevice], services: &[AiService], current: &[Assignment]) -> Vec<Assignment> {
        let mut chosen = HashMap::new();
        let Some(largest) = gpus.iter().max_by_key(|g| (g.vram_total_mb, std::cmp::Reverse(g.index))) else {
            return emit(services, current, &chosen);
        };

        let ordered = by_budget_desc(services, current);
        let mut ledger = Ledger::new(gpus);
        let rest: Vec<GpuDevice> = gpus.iter().filter(|g| g.index != largest.index).cloned().collect();

        for (i, (svc, budget)) in ordered.into_iter().enumerate() {
            let idx = if i == 0 || rest.is_empty() {
                Some(largest.index)
            } else {
                ledger.best_fit(&rest, budget)
            };
            if let Some(idx) = idx {
                ledger.place(idx, budget);
                chosen.insert(svc.name.clone(), idx);
            }
        }
        emit(services, current, &chosen)
    }

    fn name(&self) -> &'static str {
        "latency_optimized"
    }
}

// ---------------------------------------------------------------------------
// IsolationFirst: one service per GPU while GPUs last, then best fit.
// ---------------------------------------------------------------------------

pub struct IsolationFirst;

impl PlacementStrategy for IsolationFirst {
    fn plan(&self, gpus: &[GpuDevice], services: &[AiService], current: &[Assignment]) -> Vec<Assignment> {
        let mut ledger = Ledger::new(gpus);
        let mut chosen = HashMap::new();
        for (svc, budget) in by_budget_desc(services, current) {
            let empty: Vec<GpuDevice> = gpus
                .iter()
                .filter(|g| ledger.tenants.get(&g.index).copied().unwrap_or(0) == 0)
                .cloned()
                .collect();
            let idx = if empty.is_empty() {
                ledger.best_fit(gpus, budget)
            } else {
                ledger.best_fit(&empty, budget)
            };
            if let Some(idx) = idx {
                ledger.place(idx, budget);
                chosen.insert(svc.name.clone(), idx);
            }
        }
        emit(services, current, &chosen)
    }

    fn name(&self) -> &'static str {
        "isolation_first"
    }
}

// ---------------------------------------------------------------------------
// Balanced: each service onto the GPU with the least assigned budget so far.
// ---------------------------------------------------------------------------

pub struct Balanced;

impl PlacementStrategy for Balanced {
    fn plan(&self, gpus: &[GpuDevice], services: &[AiService], current: &[Assignment]) -> Vec<Assignment> {
        let mut ledger = Ledger::new(gpus);
        let mut chosen = HashMap::new();
        for (svc, budget) in by_budget_desc(services, current) {
            let idx = gpus
                .iter()
                .min_by_key(|g| (ledger.load.get(&g.index).copied().unwrap_or(0), g.index))
                .map(|g| g.index);
            if let Some(idx) = idx {
                ledger.place(idx, budget);
                chosen.insert(svc.name.clone(), idx);
            }
        }
        emit(services, current, &chosen)
    }

    fn name(&self) -> &'static str {
        "balanced"
    }
}

/// Planner for a non-manual strategy. `Manual` has nothing to compute.
pub fn planner_for(strategy: Strategy) -> Option<Box<dyn PlacementStrategy>> {
    match strategy {
        Strategy::Manual => None,
        Strategy::VramBased => Some(Box::new(VramBased)),
        Strategy::LatencyOptimized => Some(Box::new(LatencyOptimized)),
        Strategy::IsolationFirst => Some(Box::new(IsolationFirst)),
        Strategy::Balanced => Some(Box::new(Balanced)),
    }
}

/// Assignments `strategy` resolves to. `Manual` returns `current` unchanged.
pub fn resolve(strategy: Strategy, gpus: &[GpuDevice], services: &[AiService], current: &[Assignment]) -> Vec<Assignment> {
    match planner_for(strategy) {
        Some(p) => {
            let planned = p.plan(gpus, services, current);
            tracing::debug!(
                strategy = p.name(),
                placed = planned.iter().filter(|a| a.gpu_index.is_some()).count(),
                "planned assignments"
            );
            planned
        }
        None => current.to_vec(),
    }
}
