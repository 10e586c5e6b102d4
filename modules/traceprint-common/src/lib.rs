pub mod cache;
pub mod config;
pub mod error;
pub mod file_config;
pub mod normalize;
pub mod types;

pub use cache::{CacheGateway, CacheKey, MemoryCache};
pub use config::AppConfig;
pub use error::{PipelineError, PipelineResult};
pub use file_config::{CacheTtlConfig, FileConfig, PipelineConfig, ResolutionConfig};
pub use types::*;
