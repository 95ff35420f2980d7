use anyhow::{bail, Result};

use vigil_apply::DraftReconciler;

use crate::args::EditArgs;

/// Apply command-line edits to the draft. Fails on the first unknown service.
pub fn apply_edits(draft: &mut DraftReconciler, edits: &EditArgs) -> Result<()> {
    if let Some(strategy) = edits.strategy {
        draft.set_strategy(strategy);
    }
    for (service, idx) in &edits.assign {
        if !draft.set_assignment(service, Some(*idx)) {
            bail!("unknown service '{service}'");
        }
    }
    for service in &edits.unassign {
        if !draft.set_assignment(service, None) {
            bail!("unknown service '{service}'");
        }
    }
    for (service, mb) in &edits.vram {
        if *mb == 0 {
            bail!("VRAM budget for '{service}' must be positive");
        }
        if !draft.set_vram_override(service, Some(*mb)) {
            bail!("unknown service '{service}'");
        }
    }
    for service in &edits.clear_vram {
        if !draft.set_vram_override(service, None) {
            bail!("unknown service '{service}'");
        }
    }
    Ok(())
}
