// Cache worker: one deployed version of the offline cache controller
//
// A worker owns exactly one cache region, named after its version. It knows
// how to populate it (install), how to evict other versions (activate) and
// how to answer intercepted requests (fetch).

use axum::http::Method;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

use crate::offline::error::NetworkFetchError;
use crate::offline::network::{FetchRequest, Network};
use crate::offline::storage::{CacheStorage, StoredResponse};
use crate::offline::version::CacheVersion;
use crate::offline::CachePolicy;

/// How an intercepted request is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Dynamic data, always asked from the network first
    Api,
    /// Everything else, handled by the configured [`CachePolicy`]
    Asset,
    /// Non-GET requests are never cached
    Passthrough,
}

/// Where the response handed back to the client came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub response: StoredResponse,
    pub source: ResponseSource,
}

impl FetchResponse {
    pub fn from_network(response: StoredResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
        }
    }

    pub fn from_cache(response: StoredResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Cache,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub version: CacheVersion,
    /// Origin the precache paths are resolved against
    pub origin: Url,
    pub precache: Vec<String>,
    pub policy: CachePolicy,
    pub api_path_pattern: String,
    /// Activate right after install instead of waiting for clients to leave
    pub skip_waiting: bool,
    /// Take control of every connected client on activation
    pub claim_clients: bool,
}

/// Result of populating the precache
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstallReport {
    pub version: String,
    pub cached: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivateReport {
    pub version: String,
    pub deleted: Vec<String>,
}

pub struct CacheWorker {
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
}

impl CacheWorker {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            config,
            storage,
            network,
        }
    }

    pub fn version(&self) -> &CacheVersion {
        &self.config.version
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Absolute URL for a path on the worker's origin
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        self.config.origin.join(path)
    }

    /// Populate this version's region with the precache manifest.
    ///
    /// All or nothing: when any URL fails, nothing from the batch is stored
    /// and the failures are reported. Install itself never fails.
    pub async fn install(&self) -> InstallReport {
        let region = self.config.version.as_str();
        tracing::info!("Installing offline cache {}", region);

        let mut report = InstallReport {
            version: region.to_string(),
            ..Default::default()
        };

        if let Err(e) = self.storage.open(region).await {
            tracing::warn!("Failed to open cache region {}: {}", region, e);
        }

        let fetches = self.config.precache.iter().map(|path| async move {
            let outcome = match self.resolve(path) {
                Ok(url) => {
                    let request = FetchRequest::get(url.as_str());
                    match self.network.fetch(&request).await {
                        Ok(response) if response.is_cacheable() => Ok((request.url, response)),
                        Ok(response) => Err(format!("unexpected status {}", response.status)),
                        Err(e) => Err(e.to_string()),
                    }
                }
                Err(e) => Err(format!("invalid path: {}", e)),
            };
            (path.clone(), outcome)
        });

        let mut entries = Vec::new();
        for (path, outcome) in join_all(fetches).await {
            match outcome {
                Ok(entry) => entries.push((path, entry)),
                Err(reason) => {
                    tracing::warn!("Precache of {} failed: {}", path, reason);
                    report.failed.push((path, reason));
                }
            }
        }

        if !report.failed.is_empty() {
            tracing::error!(
                "Precache for {} incomplete ({} of {} failed), nothing stored",
                region,
                report.failed.len(),
                self.config.precache.len()
            );
            return report;
        }

        let (paths, batch): (Vec<String>, Vec<(String, StoredResponse)>) = entries.into_iter().unzip();
        match self.storage.put_all(region, &batch).await {
            Ok(()) => {
                tracing::info!("Precached {} assets into {}", batch.len(), region);
                report.cached = paths;
            }
            Err(e) => {
                tracing::warn!("Failed to store precache for {}: {}", region, e);
                report.failed = paths
                    .into_iter()
                    .map(|path| (path, e.to_string()))
                    .collect();
            }
        }

        report
    }

    /// Delete every cache region that is not this worker's version
    pub async fn activate(&self) -> ActivateReport {
        let current = self.config.version.as_str();
        let mut report = ActivateReport {
            version: current.to_string(),
            ..Default::default()
        };

        let regions = match self.storage.keys().await {
            Ok(regions) => regions,
            Err(e) => {
                tracing::warn!("Failed to list cache regions: {}", e);
                return report;
            }
        };

        for region in regions.into_iter().filter(|r| r != current) {
            match self.storage.delete(&region).await {
                Ok(_) => {
                    tracing::info!("Removed stale cache region {}", region);
                    report.deleted.push(region);
                }
                Err(e) => tracing::warn!("Failed to delete cache region {}: {}", region, e),
            }
        }

        tracing::info!("Offline cache {} activated", current);
        report
    }

    pub fn classify(&self, request: &FetchRequest) -> RequestKind {
        if request.method != Method::GET {
            RequestKind::Passthrough
        } else if request.path().contains(&self.config.api_path_pattern) {
            RequestKind::Api
        } else {
            RequestKind::Asset
        }
    }

    /// Answer an intercepted request
    pub async fn handle_fetch(&self, request: FetchRequest) -> Result<FetchResponse, NetworkFetchError> {
        match self.classify(&request) {
            RequestKind::Passthrough => self.network.fetch(&request).await.map(FetchResponse::from_network),
            RequestKind::Api => self.network_first(&request).await,
            RequestKind::Asset => match self.config.policy {
                CachePolicy::NetworkFirst => self.network_first(&request).await,
                CachePolicy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
            },
        }
    }

    async fn network_first(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkFetchError> {
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store(&request.url, &response).await;
                }
                Ok(FetchResponse::from_network(response))
            }
            Err(e) => {
                tracing::warn!("Network failed for {}, trying cache: {}", request.url, e);
                match self.lookup(&request.url).await {
                    Some(cached) => Ok(FetchResponse::from_cache(cached)),
                    None => Err(e),
                }
            }
        }
    }

    async fn stale_while_revalidate(&self, request: FetchRequest) -> Result<FetchResponse, NetworkFetchError> {
        let Some(cached) = self.lookup(&request.url).await else {
            let response = self.network.fetch(&request).await?;
            if response.is_cacheable() {
                self.store(&request.url, &response).await;
            }
            return Ok(FetchResponse::from_network(response));
        };

        let storage = Arc::clone(&self.storage);
        let network = Arc::clone(&self.network);
        let region = self.config.version.as_str().to_string();
        tokio::spawn(async move {
            match network.fetch(&request).await {
                Ok(fresh) if fresh.is_cacheable() => {
                    if let Err(e) = storage.put(&region, &request.url, &fresh).await {
                        tracing::debug!("Revalidation store failed for {}: {}", request.url, e);
                    }
                }
                Ok(fresh) => tracing::debug!("Revalidation of {} got {}", request.url, fresh.status),
                Err(e) => tracing::debug!("Revalidation of {} failed: {}", request.url, e),
            }
        });

        Ok(FetchResponse::from_cache(cached))
    }

    async fn lookup(&self, url: &str) -> Option<StoredResponse> {
        match self.storage.match_entry(self.config.version.as_str(), url).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Cache lookup failed for {}: {}", url, e);
                None
            }
        }
    }

    async fn store(&self, url: &str, response: &StoredResponse) {
        if let Err(e) = self.storage.put(self.config.version.as_str(), url, response).await {
            tracing::warn!("Failed to cache {}: {}", url, e);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::offline::MemoryCacheStorage;
    use std::time::Duration;

    fn build(
        version: &str,
        policy: CachePolicy,
        precache: &[&str],
    ) -> (CacheWorker, Arc<MemoryCacheStorage>, Arc<FakeNetwork>) {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(FakeNetwork::new());
        let worker = CacheWorker::new(
            worker_config(version, policy, precache),
            storage.clone(),
            network.clone(),
        );
        (worker, storage, network)
    }

    #[tokio::test]
    async fn test_install_caches_whole_manifest() {
        let (worker, storage, network) = build("v1", CachePolicy::NetworkFirst, &["/index.html", "/manifest.json"]);
        network.serve(&url("/index.html"), 200, "<html>").await;
        network.serve(&url("/manifest.json"), 200, "{}").await;

        let report = worker.install().await;

        assert!(report.is_complete());
        assert_eq!(report.cached, vec!["/index.html", "/manifest.json"]);
        assert_eq!(storage.len("v1").await, 2);
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let (worker, storage, network) = build("v1", CachePolicy::NetworkFirst, &["/index.html", "/icon-192x192.png"]);
        network.serve(&url("/index.html"), 200, "<html>").await;
        // icon missing -> 404

        let report = worker.install().await;

        assert!(!report.is_complete());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "/icon-192x192.png");
        assert!(report.cached.is_empty());
        assert_eq!(storage.len("v1").await, 0);
        // region exists so runtime caching still has a home
        assert_eq!(storage.keys().await.unwrap(), vec!["v1"]);
    }

    #[tokio::test]
    async fn test_activate_deletes_other_versions() {
        let (worker, storage, _network) = build("v3", CachePolicy::NetworkFirst, &[]);
        storage.open("v1").await.unwrap();
        storage.open("v2").await.unwrap();
        storage.open("v3").await.unwrap();

        let report = worker.activate().await;

        assert_eq!(report.deleted, vec!["v1", "v2"]);
        assert_eq!(storage.keys().await.unwrap(), vec!["v3"]);
    }

    #[test]
    fn test_classify() {
        let (worker, _, _) = build("v1", CachePolicy::NetworkFirst, &[]);
        assert_eq!(worker.classify(&FetchRequest::get(url("/api/pedidos"))), RequestKind::Api);
        assert_eq!(worker.classify(&FetchRequest::get(url("/manifest.json"))), RequestKind::Asset);
        // the pattern is matched on the path, not the query string
        assert_eq!(worker.classify(&FetchRequest::get(url("/x?next=/api/"))), RequestKind::Asset);

        let mut post = FetchRequest::get(url("/api/pedidos"));
        post.method = Method::POST;
        assert_eq!(worker.classify(&post), RequestKind::Passthrough);
    }

    #[tokio::test]
    async fn test_api_falls_back_to_cached_copy_when_offline() {
        let (worker, _storage, network) = build("v1", CachePolicy::NetworkFirst, &[]);
        network.serve(&url("/api/pedidos"), 200, r#"{"success":true}"#).await;

        let online = worker.handle_fetch(FetchRequest::get(url("/api/pedidos"))).await.unwrap();
        assert_eq!(online.source, ResponseSource::Network);

        network.set_offline(true);
        let offline = worker.handle_fetch(FetchRequest::get(url("/api/pedidos"))).await.unwrap();
        assert_eq!(offline.source, ResponseSource::Cache);
        assert_eq!(offline.response.body, br#"{"success":true}"#.to_vec());
    }

    #[tokio::test]
    async fn test_api_failure_propagates_without_cached_copy() {
        let (worker, _storage, network) = build("v1", CachePolicy::NetworkFirst, &[]);
        network.set_offline(true);

        let result = worker.handle_fetch(FetchRequest::get(url("/api/pedidos"))).await;
        assert!(matches!(result, Err(NetworkFetchError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_network_first_does_not_cache_errors() {
        let (worker, storage, network) = build("v1", CachePolicy::NetworkFirst, &[]);
        network.serve(&url("/broken"), 500, "boom").await;

        let response = worker.handle_fetch(FetchRequest::get(url("/broken"))).await.unwrap();
        assert_eq!(response.response.status, 500);
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(storage.len("v1").await, 0);
    }

    #[tokio::test]
    async fn test_network_first_prefers_fresh_response() {
        let (worker, _storage, network) = build("v1", CachePolicy::NetworkFirst, &[]);
        network.serve(&url("/app.js"), 200, "old").await;
        worker.handle_fetch(FetchRequest::get(url("/app.js"))).await.unwrap();

        network.serve(&url("/app.js"), 200, "new").await;
        let response = worker.handle_fetch(FetchRequest::get(url("/app.js"))).await.unwrap();
        assert_eq!(response.response.body, b"new".to_vec());
        assert_eq!(response.source, ResponseSource::Network);
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_serves_cache_and_refreshes() {
        let (worker, storage, network) = build("v1", CachePolicy::StaleWhileRevalidate, &[]);
        network.serve(&url("/app.js"), 200, "old").await;

        let first = worker.handle_fetch(FetchRequest::get(url("/app.js"))).await.unwrap();
        assert_eq!(first.source, ResponseSource::Network);

        network.serve(&url("/app.js"), 200, "new").await;
        let second = worker.handle_fetch(FetchRequest::get(url("/app.js"))).await.unwrap();
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.response.body, b"old".to_vec());

        // background refresh lands eventually
        let mut refreshed = false;
        for _ in 0..50 {
            let entry = storage.match_entry("v1", &url("/app.js")).await.unwrap().unwrap();
            if entry.body == b"new".to_vec() {
                refreshed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(refreshed);
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_swallows_refresh_failure() {
        let (worker, storage, network) = build("v1", CachePolicy::StaleWhileRevalidate, &[]);
        storage
            .put("v1", &url("/app.js"), &StoredResponse::new(200, vec![], "cached"))
            .await
            .unwrap();
        network.set_offline(true);

        let response = worker.handle_fetch(FetchRequest::get(url("/app.js"))).await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.response.body, b"cached".to_vec());
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_miss_goes_to_network() {
        let (worker, _storage, network) = build("v1", CachePolicy::StaleWhileRevalidate, &[]);
        network.set_offline(true);

        let result = worker.handle_fetch(FetchRequest::get(url("/app.js"))).await;
        assert!(result.is_err());
        assert_eq!(network.call_count(), 1);
    }

    #[tokio::test]
    async fn test_post_bypasses_cache() {
        let (worker, storage, network) = build("v1", CachePolicy::NetworkFirst, &[]);
        network.serve(&url("/api/pedidos"), 200, "ok").await;

        let mut post = FetchRequest::get(url("/api/pedidos"));
        post.method = Method::POST;
        worker.handle_fetch(post).await.unwrap();

        assert_eq!(storage.len("v1").await, 0);
    }
}
