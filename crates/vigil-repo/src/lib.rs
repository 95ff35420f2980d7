pub mod http;
pub mod memory;
pub mod planner;
pub mod types;

pub use http::HttpConfigRepository;
pub use memory::MemoryConfigRepository;
pub use types::{ConfigRepository, RepoError, RepoResult};
