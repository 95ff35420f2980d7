pub mod apply;
pub mod config;
pub mod gpu;
pub mod service;

pub use apply::{ApplyResult, PreviewResult};
pub use config::{Assignment, DraftConfig, GpuConfig, Strategy, UpdateConfigResult};
pub use gpu::GpuDevice;
pub use service::{all_settled, AiService, RestartStatus, ServiceHealth, ServiceHealthStatus};

pub mod telemetry;
