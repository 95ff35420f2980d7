use std::collections::HashSet;

use vigil_common::{Assignment, DraftConfig, GpuConfig, GpuDevice, Strategy};

/// Tracks a session's unsaved edits against the last configuration fetched
/// from the backend.
///
/// Pure in-memory state: inputs come from catalogs the caller has already
/// fetched, so there are no error paths here.
#[derive(Debug, Clone)]
pub struct DraftReconciler {
    base: GpuConfig,
    draft: DraftConfig,
    strategy_epoch: u64,
}

impl DraftReconciler {
    pub fn new(config: GpuConfig) -> Self {
        Self {
            draft: config.to_draft(),
            base: config,
            strategy_epoch: 0,
        }
    }

    /// Replace the draft wholesale with `config` and make it the new base.
    pub fn initialize(&mut self, config: GpuConfig) {
        self.draft = config.to_draft();
        self.base = config;
        self.strategy_epoch += 1;
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.draft.strategy = strategy;
        self.strategy_epoch += 1;
    }

    /// Point one service at a GPU (or unassign it). Returns false for an unknown service.
    pub fn set_assignment(&mut self, service: &str, gpu_index: Option<u32>) -> bool {
        self.update(service, |a| a.gpu_index = gpu_index)
    }

    pub fn set_vram_override(&mut self, service: &str, value: Option<u64>) -> bool {
        self.update(service, |a| a.vram_budget_override = value)
    }

    fn update(&mut self, service: &str, f: impl FnOnce(&mut Assignment)) -> bool {
        match self.draft.assignments.iter_mut().find(|a| a.service == service) {
            Some(a) => {
                f(a);
                true
            }
            None => {
                tracing::debug!(%service, "ignoring edit for unknown service");
                false
            }
        }
    }

    /// Discard all edits.
    pub fn reset(&mut self) {
        self.draft = self.base.to_draft();
        self.strategy_epoch += 1;
    }

    pub fn has_changes(&self) -> bool {
        self.draft.strategy != self.base.strategy || self.draft.assignments != self.base.assignments
    }

    pub fn draft(&self) -> &DraftConfig {
        &self.draft
    }

    pub fn base(&self) -> &GpuConfig {
        &self.base
    }

    /// Bumped whenever the draft strategy may have changed; previews taken at an
    /// older epoch are stale.
    pub fn strategy_epoch(&self) -> u64 {
        self.strategy_epoch
    }

    /// Assignments pointing at GPUs that are not in `gpus`.
    pub fn stale_assignments<'a>(&'a self, gpus: &[GpuDevice]) -> Vec<&'a Assignment> {
        let present: HashSet<u32> = gpus.iter().map(|g| g.index).collect();
        self.draft
            .assignments
            .iter()
            .filter(|a| a.gpu_index.is_some_and(|idx| !present.contains(&idx)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GpuConfig {
        GpuConfig {
            strategy: Strategy::Manual,
            assignments: vec![
                Assignment::pinned("ai-llm", 0),
                Assignment::unassigned("ai-enrichment"),
                Assignment::pinned("ai-face", 1),
            ],
            updated_at: None,
            strategies: vec!["manual".to_string(), "balanced".to_string()],
        }
    }

    #[test]
    fn test_initialize_clears_changes() {
        let mut d = DraftReconciler::new(config());
        assert!(!d.has_changes());

        d.set_assignment("ai-llm", Some(1));
        assert!(d.has_changes());

        d.initialize(config());
        assert!(!d.has_changes());
        assert_eq!(d.draft(), &config().to_draft());
    }

    #[test]
    fn test_set_assignment_touches_one_service() {
        let mut d = DraftReconciler::new(config());
        assert!(d.set_assignment("ai-enrichment", Some(1)));

        let draft = d.draft();
        assert_eq!(draft.assignment("ai-enrichment").and_then(|a| a.gpu_index), Some(1));
        assert_eq!(draft.assignment("ai-llm"), Some(&Assignment::pinned("ai-llm", 0)));
        assert_eq!(draft.assignment("ai-face"), Some(&Assignment::pinned("ai-face", 1)));
    }

    #[test]
    fn test_unknown_service_is_noop() {
        let mut d = DraftReconciler::new(config());
        assert!(!d.set_assignment("ai-ocr", Some(0)));
        assert!(!d.set_vram_override("ai-ocr", Some(100)));
        assert!(!d.has_changes());
    }

    #[test]
    fn test_edit_back_to_original_has_no_changes() {
        let mut d = DraftReconciler::new(config());
        d.set_strategy(Strategy::Balanced);
        d.set_vram_override("ai-llm", Some(12_000));
        d.set_assignment("ai-face", None);
        assert!(d.has_changes());

        d.set_strategy(Strategy::Manual);
        d.set_vram_override("ai-llm", None);
        d.set_assignment("ai-face", Some(1));
        assert!(!d.has_changes());
    }

    #[test]
    fn test_has_changes_matches_structural_diff() {
        // every edit sequence over a small alphabet: has_changes iff draft != base
        let edits: Vec<Box<dyn Fn(&mut DraftReconciler)>> = vec![
            Box::new(|d| d.set_strategy(Strategy::Balanced)),
            Box::new(|d| d.set_strategy(Strategy::Manual)),
            Box::new(|d| {
                d.set_assignment("ai-llm", Some(1));
            }),
            Box::new(|d| {
                d.set_assignment("ai-llm", Some(0));
            }),
            Box::new(|d| {
                d.set_assignment("ai-enrichment", None);
            }),
            Box::new(|d| {
                d.set_vram_override("ai-face", Some(2_048));
            }),
            Box::new(|d| {
                d.set_vram_override("ai-face", None);
            }),
        ];

        for a in 0..edits.len() {
            for b in 0..edits.len() {
                for c in 0..edits.len() {
                    let mut d = DraftReconciler::new(config());
                    edits[a](&mut d);
                    edits[b](&mut d);
                    edits[c](&mut d);
                    let expected = d.draft() != &d.base().to_draft();
                    assert_eq!(d.has_changes(), expected, "sequence {a},{b},{c}");
                }
            }
        }
    }

    #[test]
    fn test_reset_and_epoch() {
        let mut d = DraftReconciler::new(config());
        let e0 = d.strategy_epoch();
        d.set_strategy(Strategy::VramBased);
        assert!(d.strategy_epoch() > e0);

        let e1 = d.strategy_epoch();
        d.set_assignment("ai-llm", None);
        assert_eq!(d.strategy_epoch(), e1);

        d.reset();
        assert!(!d.has_changes());
        assert_eq!(d.draft().strategy, Strategy::Manual);
    }

    #[test]
    fn test_stale_assignments() {
        let mut d = DraftReconciler::new(config());
        d.set_assignment("ai-enrichment", Some(5));
        let gpus = vec![GpuDevice {
            index: 0,
            name: "A2".to_string(),
            vram_total_mb: 16_384,
            vram_used_mb: 0,
            compute_capability: None,
        }];
        let stale: Vec<&str> = d.stale_assignments(&gpus).iter().map(|a| a.service.as_str()).collect();
        assert_eq!(stale, vec!["ai-enrichment", "ai-face"]);
    }
}
