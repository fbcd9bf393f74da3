//! Process-lifetime in-memory storage.

use async_trait::async_trait;
use dashmap::DashMap;

use super::error::CacheError;
use super::fingerprint::Fingerprint;
use super::response::CachedResponse;
use super::store::Storage;

/// Concurrent map from storage key to response.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, CachedResponse>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn key(&self, fingerprint: &Fingerprint, timestamp: Option<i64>) -> String {
        match timestamp {
            Some(ts) => format!("{}-{}", fingerprint, ts),
            None => fingerprint.to_string(),
        }
    }

    async fn contains(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.contains_key(key))
    }

    async fn load(&self, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    async fn store(&self, key: &str, response: &CachedResponse) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), response.clone());
        Ok(())
    }
}
