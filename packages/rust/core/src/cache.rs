//! Cache collaborator: JSON values by key with a TTL.
//!
//! Failures are soft. Implementations log and report a miss (`None`) or a
//! failed write (`false`) instead of returning errors, so the pipeline
//! degrades to always-miss when the backend is unavailable.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use enrichment_storage::Storage;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    /// Returns whether the write succeeded.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> bool;
}

/// Read and decode a typed value. Undecodable entries read as a miss.
pub async fn get_as<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    let value = cache.get(key).await?;
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(key, error = %e, "discarding undecodable cache entry");
            None
        }
    }
}

/// Encode and write a typed value.
pub async fn set_as<T: Serialize>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration) -> bool {
    match serde_json::to_value(value) {
        Ok(json) => cache.set(key, json, ttl).await,
        Err(e) => {
            warn!(key, error = %e, "failed to encode cache value");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory cache
// ---------------------------------------------------------------------------

struct MemoryEntry {
    value: Value,
    expires_at: Instant,
}

/// Process-local cache. Expiry follows the tokio clock, so paused-time
/// tests can advance past a TTL.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> bool {
        let entry = MemoryEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().await.insert(key.to_string(), entry);
        true
    }
}

// ---------------------------------------------------------------------------
// libSQL-backed cache
// ---------------------------------------------------------------------------

#[async_trait]
impl Cache for Storage {
    async fn get(&self, key: &str) -> Option<Value> {
        let raw = match self.cache_get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "corrupt cache entry, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> bool {
        let json = value.to_string();
        match self.cache_set(key, &json, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "cache write failed");
                false
            }
        }
    }
}
