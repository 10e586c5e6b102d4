//! Where raw source payloads come from.
//!
//! A `SourceFeed` hands back the raw JSON payload one platform produced for
//! one user. The production feed reads capture files dropped by upstream
//! collectors; tests use `MemoryFeed`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use traceprint_common::{Source, User};

#[async_trait]
pub trait SourceFeed: Send + Sync {
    /// Fetch the raw payload `source` produced for `user`. Errors here are
    /// per-source: the orchestrator records them and keeps going.
    async fn capture(&self, source: Source, user: &User) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// File-backed feed
// ---------------------------------------------------------------------------

/// Reads `<dir>/<source>.json` capture files. A missing file means that
/// source has nothing for this user on this run.
pub struct FileFeed {
    dir: PathBuf,
}

impl FileFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SourceFeed for FileFeed {
    async fn capture(&self, source: Source, _user: &User) -> Result<Value> {
        let path = self.dir.join(format!("{source}.json"));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Value::Null),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read capture file: {}", path.display()))
            }
        };
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Malformed capture file: {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// In-memory feed
// ---------------------------------------------------------------------------

/// Canned payloads keyed by source, with optional forced failures.
#[derive(Default)]
pub struct MemoryFeed {
    payloads: HashMap<Source, Value>,
    failing: HashSet<Source>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, source: Source, payload: Value) -> Self {
        self.payloads.insert(source, payload);
        self
    }

    /// Make `source` fail every capture call.
    pub fn failing(mut self, source: Source) -> Self {
        self.failing.insert(source);
        self
    }
}

#[async_trait]
impl SourceFeed for MemoryFeed {
    async fn capture(&self, source: Source, _user: &User) -> Result<Value> {
        if self.failing.contains(&source) {
            bail!("source offline: {source}");
        }
        match self.payloads.get(&source) {
            Some(payload) => Ok(payload.clone()),
            None => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new("Rocky Balboa", "rocky@example.com")
    }

    #[tokio::test]
    async fn missing_capture_file_reads_as_empty() {
        let feed = FileFeed::new("/nonexistent/captures");
        let payload = feed.capture(Source::Facebook, &user()).await.unwrap();
        assert!(payload.is_null());
    }

    #[tokio::test]
    async fn malformed_capture_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("traceprint-feed-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("facebook.json"), "not json").unwrap();

        let feed = FileFeed::new(&dir);
        let err = feed.capture(Source::Facebook, &user()).await.unwrap_err();
        assert!(err.to_string().contains("Malformed capture file"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
