use vigil_common::{AiService, GpuDevice};

const MODELS: [(&str, u64, &str); 4] = [
    ("RTX 4090", 24_576, "8.9"),
    ("RTX 3060", 12_288, "8.6"),
    ("RTX A5000", 24_576, "8.6"),
    ("A2", 16_384, "8.6"),
];

/// `count` GPUs cycling through a few common cards, each with a little VRAM
/// already taken by the desktop.
pub fn simulated_gpus(count: u32) -> Vec<GpuDevice> {
    (0..count)
        .map(|index| {
            let (name, total, cc) = MODELS[index as usize % MODELS.len()];
            GpuDevice {
                index,
                name: name.to_string(),
                vram_total_mb: total,
                vram_used_mb: 512,
                compute_capability: Some(cc.to_string()),
            }
        })
        .collect()
}

pub fn default_services() -> Vec<AiService> {
    [
        ("ai-llm", "Nemotron LLM", 14_000),
        ("ai-detector", "Object Detector", 4_000),
        ("ai-enrichment", "Enrichment", 3_500),
        ("ai-face", "Face Recognition", 1_500),
    ]
    .into_iter()
    .map(|(name, display, vram)| AiService {
        name: name.to_string(),
        display_name: display.to_string(),
        vram_requirement_mb: vram,
    })
    .collect()
}
