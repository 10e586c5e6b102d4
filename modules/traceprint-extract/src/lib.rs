//! Extraction stage: fans out across every configured source for one user,
//! tolerates per-source failures, and emits a single `ExtractionResult`.

pub mod feed;
pub mod orchestrator;
pub mod records;

pub use feed::{FileFeed, MemoryFeed, SourceFeed};
pub use orchestrator::{ExtractionMetadata, Orchestrator};
