//! Cache gateway shared by every pipeline stage.
//!
//! The cache is strictly best-effort. A backend failure on any operation is
//! logged and treated as a miss; the pipeline never fails because the cache
//! did.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Structured cache key. Rendered as `entity:user_id:hash`, so a user's
/// entries share a scannable prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub entity: &'static str,
    pub user_id: Uuid,
    pub hash: String,
}

impl CacheKey {
    pub fn new(entity: &'static str, user_id: Uuid, hash: impl Into<String>) -> Self {
        Self {
            entity,
            user_id,
            hash: hash.into(),
        }
    }

    pub fn render(&self) -> String {
        format!("{}:{}:{}", self.entity, self.user_id, self.hash)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

/// Read/write/invalidate interface over whichever cache backend is wired in.
#[async_trait]
pub trait CacheGateway: Send + Sync {
    /// Fetch a cached value. Expired or missing entries return `None`.
    async fn get(&self, key: &CacheKey) -> Option<Value>;

    /// Store a value with a TTL. Failures are swallowed by the impl.
    async fn set(&self, key: &CacheKey, value: Value, ttl: Duration);

    /// Drop an entry if present.
    async fn invalidate(&self, key: &CacheKey);
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// HashMap-backed cache for tests and cacheless runs. Expiry is checked
/// lazily on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Value, Option<Instant>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheGateway for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap();
        let rendered = key.render();
        let expired = match entries.get(&rendered) {
            Some((_, deadline)) => deadline.map_or(false, |d| d <= Instant::now()),
            None => return None,
        };
        if expired {
            entries.remove(&rendered);
            return None;
        }
        entries.get(&rendered).map(|(v, _)| v.clone())
    }

    async fn set(&self, key: &CacheKey, value: Value, ttl: Duration) {
        let deadline = Instant::now().checked_add(ttl);
        self.entries
            .lock()
            .unwrap()
            .insert(key.render(), (value, deadline));
    }

    async fn invalidate(&self, key: &CacheKey) {
        self.entries.lock().unwrap().remove(&key.render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_invalidate_round_trip() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("extraction", Uuid::new_v4(), "abc123");

        assert!(cache.get(&key).await.is_none());

        cache
            .set(&key, json!({"records": 3}), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get(&key).await, Some(json!({"records": 3})));

        cache.invalidate(&key).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_read_as_misses() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("user", Uuid::new_v4(), "profile");

        cache.set(&key, json!("stale"), Duration::from_secs(0)).await;
        assert!(cache.get(&key).await.is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn keys_render_with_entity_prefix() {
        let id = Uuid::nil();
        let key = CacheKey::new("metadata", id, "run-1");
        assert_eq!(
            key.render(),
            "metadata:00000000-0000-0000-0000-000000000000:run-1"
        );
    }
}
