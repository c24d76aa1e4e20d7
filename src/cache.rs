//! In-memory TTL cache used for hot business lookups.
//!
//! The cache is constructed explicitly and handed to the services that need
//! it; there is no module-level state. Invalidation is explicit and keyed.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            Instant::now() > expires_at
        } else {
            false
        }
    }
}

/// In-memory cache with per-entry TTL.
#[derive(Debug, Clone)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let store = self.store.read().ok()?;
        match store.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(store);
                if let Ok(mut store) = self.store.write() {
                    store.remove(key);
                }
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut store = self
            .store
            .write()
            .map_err(|e| CacheError::OperationFailed(e.to_string()))?;
        store.insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    pub fn delete(&self, key: &str) {
        if let Ok(mut store) = self.store.write() {
            store.remove(key);
        }
    }

    /// Fetches and deserializes a cached JSON value.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        serde_json::from_str(&raw).ok()
    }

    /// Serializes and stores a value as JSON.
    pub fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw, ttl)
    }
}

/// Cache key for a business looked up by slug.
pub fn business_key(slug: &str) -> String {
    format!("business:slug:{slug}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_roundtrip() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", None).unwrap();
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn entries_expire() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Some(Duration::from_millis(1))).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn delete_removes_entry() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", None).unwrap();
        cache.delete("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn json_roundtrip() {
        let cache = InMemoryCache::new();
        cache.set_json("nums", &vec![1u32, 2, 3], None).unwrap();
        let got: Vec<u32> = cache.get_json("nums").unwrap();
        assert_eq!(got, vec![1, 2, 3]);
    }
}
