// Offline cache controller: versioned cache regions, worker lifecycle and the caching proxy
pub mod error;
pub mod network;
pub mod proxy;
pub mod registration;
pub mod storage;
pub mod version;
pub mod worker;

pub use error::{CacheOperationError, NetworkFetchError};
pub use network::{FetchRequest, HttpNetwork, Network};
pub use registration::{ClientId, ControlMessage, RegistrationStatus, WorkerRegistration, WorkerState};
pub use storage::{CacheStorage, MemoryCacheStorage, StoredResponse};
pub use version::CacheVersion;
pub use worker::{
    ActivateReport, CacheWorker, FetchResponse, InstallReport, RequestKind, ResponseSource,
    WorkerConfig,
};

use serde::{Deserialize, Serialize};

/// Caching policy for non-API requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Network, store 200s, fall back to the cache when the network fails
    #[default]
    NetworkFirst,
    /// Serve the cached copy at once and refresh it in the background
    StaleWhileRevalidate,
}
