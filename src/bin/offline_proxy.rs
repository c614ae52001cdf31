use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use pedidos_dashboard::config::Config;
use pedidos_dashboard::offline::proxy::{create_proxy_router, ProxyState, WorkerTemplate};
use pedidos_dashboard::offline::{CacheVersion, HttpNetwork, WorkerConfig, WorkerRegistration};
use pedidos_dashboard::storage::SqliteCacheStorage;

/// Upper bound for one upstream round trip
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let offline = &config.offline;
    let origin = Url::parse(&offline.upstream_url)
        .with_context(|| format!("Invalid OFFLINE_UPSTREAM_URL {}", offline.upstream_url))?;

    let storage = Arc::new(
        SqliteCacheStorage::new(&offline.cache_path)
            .await
            .with_context(|| format!("Failed to open cache at {}", offline.cache_path))?,
    );
    let network = Arc::new(HttpNetwork::new(UPSTREAM_TIMEOUT)?);

    let version = CacheVersion::resolve(&offline.cache_prefix, offline.cache_version.as_deref());
    let template = WorkerTemplate {
        config: WorkerConfig {
            version: version.clone(),
            origin,
            precache: offline.precache.clone(),
            policy: offline.policy,
            api_path_pattern: offline.api_path_pattern.clone(),
            skip_waiting: offline.skip_waiting,
            claim_clients: offline.claim_clients,
        },
        cache_prefix: offline.cache_prefix.clone(),
        storage,
        network: network.clone(),
    };

    let registration = Arc::new(WorkerRegistration::new(network));
    let (state, report) = ProxyState::start(registration, template, version).await;
    if !report.is_complete() {
        warn!(
            "Offline cache {} installed without precache ({} asset(s) failed)",
            report.version,
            report.failed.len()
        );
    }

    let app = create_proxy_router(state);

    let addr: SocketAddr = config.offline_address().parse()?;
    info!("Offline proxy listening on http://{} -> {}", addr, offline.upstream_url);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
