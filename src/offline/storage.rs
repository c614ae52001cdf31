// Region-scoped response store backing the offline cache
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::offline::error::CacheOperationError;

/// A response as kept in a cache region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StoredResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Only complete 200 responses are worth keeping
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Key-value store scoped by region name (one region per cache version).
///
/// Regions never see each other's entries. `put` replaces an entry as a
/// whole, so concurrent writers to the same URL cannot interleave.
#[async_trait::async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of every existing region
    async fn keys(&self) -> Result<Vec<String>, CacheOperationError>;

    /// Create the region if it does not exist yet
    async fn open(&self, region: &str) -> Result<(), CacheOperationError>;

    async fn match_entry(
        &self,
        region: &str,
        url: &str,
    ) -> Result<Option<StoredResponse>, CacheOperationError>;

    /// Store a response, creating the region if needed
    async fn put(
        &self,
        region: &str,
        url: &str,
        response: &StoredResponse,
    ) -> Result<(), CacheOperationError>;

    /// Store a batch of responses; either all of them land or none do
    async fn put_all(
        &self,
        region: &str,
        entries: &[(String, StoredResponse)],
    ) -> Result<(), CacheOperationError>;

    /// Drop a region and all its entries. Returns false if it did not exist.
    async fn delete(&self, region: &str) -> Result<bool, CacheOperationError>;
}

/// In-process storage, lost on restart
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    regions: RwLock<HashMap<String, HashMap<String, StoredResponse>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a region, 0 if it does not exist
    pub async fn len(&self, region: &str) -> usize {
        self.regions
            .read()
            .await
            .get(region)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn keys(&self) -> Result<Vec<String>, CacheOperationError> {
        let mut names: Vec<String> = self.regions.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn open(&self, region: &str) -> Result<(), CacheOperationError> {
        self.regions
            .write()
            .await
            .entry(region.to_string())
            .or_default();
        Ok(())
    }

    async fn match_entry(
        &self,
        region: &str,
        url: &str,
    ) -> Result<Option<StoredResponse>, CacheOperationError> {
        Ok(self
            .regions
            .read()
            .await
            .get(region)
            .and_then(|entries| entries.get(url))
            .cloned())
    }

    async fn put(
        &self,
        region: &str,
        url: &str,
        response: &StoredResponse,
    ) -> Result<(), CacheOperationError> {
        self.regions
            .write()
            .await
            .entry(region.to_string())
            .or_default()
            .insert(url.to_string(), response.clone());
        Ok(())
    }

    async fn put_all(
        &self,
        region: &str,
        entries: &[(String, StoredResponse)],
    ) -> Result<(), CacheOperationError> {
        let mut regions = self.regions.write().await;
        let target = regions.entry(region.to_string()).or_default();
        for (url, response) in entries {
            target.insert(url.clone(), response.clone());
        }
        Ok(())
    }

    async fn delete(&self, region: &str) -> Result<bool, CacheOperationError> {
        Ok(self.regions.write().await.remove(region).is_some())
    }
}
