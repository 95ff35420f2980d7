use serde::{Deserialize, Serialize};

/// Snapshot of one physical GPU as reported by the backend inventory.
///
/// Inventories are replaced wholesale (fetch or rescan), never patched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GpuDevice {
    pub index: u32,
    pub name: String,
    pub vram_total_mb: u64,
    pub vram_used_mb: u64,

    #[serde(default)]
    pub compute_capability: Option<String>,
}

impl GpuDevice {
    /// Free VRAM. `vram_used_mb` is backend truth and may exceed the total.
    pub fn vram_free_mb(&self) -> u64 {
        self.vram_total_mb.saturating_sub(self.vram_used_mb)
    }
}
