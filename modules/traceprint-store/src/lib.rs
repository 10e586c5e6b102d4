//! Postgres persistence: schema, transactional loading, read-side queries,
//! and the database-backed cache.

pub mod cache;
pub mod loader;
pub mod migrate;
pub mod store;

pub use cache::PgCache;
pub use loader::{LoadSummary, Loader};
pub use migrate::migrate;
pub use store::Store;
