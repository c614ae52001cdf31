// HTTP front for the offline cache controller. Requests outside `/__offline/`
// are handled for this proxy's client and answered from network or cache.

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::api::middleware::AppError;
use crate::offline::network::{is_hop_by_hop, FetchRequest, Network};
use crate::offline::registration::{ClientId, ControlMessage, WorkerRegistration};
use crate::offline::storage::CacheStorage;
use crate::offline::version::CacheVersion;
use crate::offline::worker::{CacheWorker, FetchResponse, InstallReport, WorkerConfig};

/// Response header naming where the body came from
pub const SOURCE_HEADER: &str = "x-offline-source";

/// Largest request body forwarded upstream
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Everything needed to build a worker for a new cache version
pub struct WorkerTemplate {
    /// Settings shared by every version; `version` is replaced per build
    pub config: WorkerConfig,
    pub cache_prefix: String,
    pub storage: Arc<dyn CacheStorage>,
    pub network: Arc<dyn Network>,
}

impl WorkerTemplate {
    pub fn build(&self, version: CacheVersion) -> CacheWorker {
        let mut config = self.config.clone();
        config.version = version;
        CacheWorker::new(config, self.storage.clone(), self.network.clone())
    }

    /// Explicit name if given, else a fresh timestamped version
    pub fn next_version(&self, explicit: Option<&str>) -> CacheVersion {
        match explicit.map(str::trim).filter(|v| !v.is_empty()) {
            Some(name) => CacheVersion::resolve(&self.cache_prefix, Some(name)),
            None => CacheVersion::from_build_timestamp(&self.cache_prefix, Utc::now()),
        }
    }
}

#[derive(Clone)]
pub struct ProxyState {
    pub registration: Arc<WorkerRegistration>,
    pub client: ClientId,
    /// Upstream origin every intercepted path is anchored to
    pub origin: Url,
    pub template: Arc<WorkerTemplate>,
}

impl ProxyState {
    /// Register the first worker, then connect the proxy client so it is
    /// controlled whether or not workers claim clients.
    pub async fn start(
        registration: Arc<WorkerRegistration>,
        template: WorkerTemplate,
        version: CacheVersion,
    ) -> (Self, InstallReport) {
        let report = registration.register(template.build(version)).await;
        let client = registration.connect_client().await;
        let state = Self {
            registration,
            client,
            origin: template.config.origin.clone(),
            template: Arc::new(template),
        };
        (state, report)
    }
}

#[derive(Debug, Default, Deserialize)]
struct UpdateRequest {
    version: Option<String>,
}

pub fn create_proxy_router(state: ProxyState) -> Router {
    Router::new()
        .route("/__offline/message", post(post_message))
        .route("/__offline/status", get(registration_status))
        .route("/__offline/update", post(install_update))
        .fallback(proxy_request)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Accept a control message such as `{"type":"SKIP_WAITING"}`
async fn post_message(
    State(state): State<ProxyState>,
    Json(message): Json<ControlMessage>,
) -> impl IntoResponse {
    let report = state.registration.post_message(message).await;
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "accepted": true,
            "activated": report.map(|r| r.version),
        })),
    )
}

/// Install a new cache version next to the active one. It waits for
/// `SKIP_WAITING` unless workers skip waiting on their own.
async fn install_update(
    State(state): State<ProxyState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request: UpdateRequest = if body.is_empty() {
        UpdateRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid update request: {}", e)))?
    };

    let version = state.template.next_version(request.version.as_deref());
    let current = state.registration.status().await;
    if current.active.as_ref().map(|w| w.version.as_str()) == Some(version.as_str()) {
        return Err(AppError::Validation(format!(
            "Cache version {} is already active",
            version
        )));
    }

    tracing::info!("Installing cache update {}", version);
    let report = state.registration.register(state.template.build(version)).await;
    let status = state.registration.status().await;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "installed": report,
            "registration": status,
        })),
    ))
}

async fn registration_status(State(state): State<ProxyState>) -> impl IntoResponse {
    let controller = state.registration.controller_of(state.client).await;
    let status = state.registration.status().await;
    Json(serde_json::json!({
        "registration": status,
        "controller": controller.map(|v| v.to_string()),
    }))
}

async fn proxy_request(
    State(state): State<ProxyState>,
    request: Request,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();

    let url = upstream_url(&state.origin, &parts.uri);

    let headers = parts
        .headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read request body: {}", e)))?;

    let fetch = FetchRequest {
        method: parts.method,
        url: url.to_string(),
        headers,
        body: body.to_vec(),
    };

    let response = state.registration.fetch(state.client, fetch).await?;
    into_http_response(response)
}

/// Anchor the request target to the upstream origin. Only path and query
/// are taken from the request, so `//other-host/...` stays on the origin.
fn upstream_url(origin: &Url, uri: &Uri) -> Url {
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    url
}

fn into_http_response(fetched: FetchResponse) -> Result<Response, AppError> {
    let FetchResponse { response, source } = fetched;
    let status = StatusCode::from_u16(response.status)
        .map_err(|e| AppError::Internal(format!("Invalid upstream status: {}", e)))?;

    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        if !is_hop_by_hop(name) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder
        .header(SOURCE_HEADER, HeaderValue::from_static(source.as_str()))
        .body(Body::from(response.body))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::ErrorResponse;
    use crate::offline::worker::testing::*;
    use crate::offline::{CachePolicy, MemoryCacheStorage};
    use tower::ServiceExt;

    fn template(network: &Arc<FakeNetwork>, skip_waiting: bool, claim_clients: bool) -> WorkerTemplate {
        let mut config = worker_config("pagcorp-v1", CachePolicy::NetworkFirst, &[]);
        config.skip_waiting = skip_waiting;
        config.claim_clients = claim_clients;
        WorkerTemplate {
            config,
            cache_prefix: "pagcorp".to_string(),
            storage: Arc::new(MemoryCacheStorage::new()),
            network: network.clone(),
        }
    }

    async fn start(skip_waiting: bool, claim_clients: bool) -> (Router, Arc<FakeNetwork>) {
        let network = Arc::new(FakeNetwork::new());
        let registration = Arc::new(WorkerRegistration::new(network.clone()));
        let (state, report) = ProxyState::start(
            registration,
            template(&network, skip_waiting, claim_clients),
            CacheVersion::new("pagcorp-v1"),
        )
        .await;
        assert!(report.is_complete());
        (create_proxy_router(state), network)
    }

    async fn setup() -> (Router, Arc<FakeNetwork>) {
        start(true, true).await
    }

    fn get_request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_str(&body_string(response).await).unwrap()
    }

    #[test]
    fn test_upstream_url_keeps_origin() {
        let origin = Url::parse(ORIGIN).unwrap();

        let uri: Uri = "/api/pedidos?x=1".parse().unwrap();
        assert_eq!(upstream_url(&origin, &uri).as_str(), "http://app.test/api/pedidos?x=1");

        let uri: Uri = "//evil.test/secret".parse().unwrap();
        let url = upstream_url(&origin, &uri);
        assert_eq!(url.host_str(), Some("app.test"));
        assert_eq!(url.path(), "//evil.test/secret");
    }

    #[tokio::test]
    async fn test_forwards_and_marks_network_source() {
        let (router, network) = setup().await;
        network.serve(&url("/api/pedidos"), 200, r#"{"success":true}"#).await;

        let response = router.oneshot(get_request("/api/pedidos")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[SOURCE_HEADER], "network");
        assert_eq!(body_string(response).await, r#"{"success":true}"#);
    }

    #[tokio::test]
    async fn test_scheme_relative_target_stays_on_origin() {
        let (router, network) = setup().await;
        network.serve("http://evil.test/secret", 200, "from-another-host").await;

        let response = router.oneshot(get_request("//evil.test/secret")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_ne!(body_string(response).await, "from-another-host");
    }

    #[tokio::test]
    async fn test_serves_cached_copy_when_upstream_down() {
        let (router, network) = setup().await;
        network.serve(&url("/api/pedidos"), 200, r#"{"success":true}"#).await;
        router.clone().oneshot(get_request("/api/pedidos")).await.unwrap();

        network.set_offline(true);
        let response = router.oneshot(get_request("/api/pedidos")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[SOURCE_HEADER], "cache");
    }

    #[tokio::test]
    async fn test_offline_fallback_without_claiming_clients() {
        let (router, network) = start(true, false).await;
        network.serve(&url("/api/pedidos"), 200, r#"{"success":true}"#).await;
        router.clone().oneshot(get_request("/api/pedidos")).await.unwrap();

        network.set_offline(true);
        let response = router.oneshot(get_request("/api/pedidos")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[SOURCE_HEADER], "cache");
    }

    #[tokio::test]
    async fn test_upstream_down_without_cache_is_bad_gateway() {
        let (router, network) = setup().await;
        network.set_offline(true);

        let response = router.oneshot(get_request("/api/pedidos")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.code, "UPSTREAM_ERROR");
    }

    #[tokio::test]
    async fn test_skip_waiting_without_waiting_worker() {
        let (router, _network) = setup().await;

        let response = router
            .oneshot(post_json("/__offline/message", r#"{"type":"SKIP_WAITING"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(body_json(response).await["activated"].is_null());
    }

    #[tokio::test]
    async fn test_update_waits_then_skip_waiting_activates() {
        let (router, _network) = start(false, true).await;

        let response = router
            .clone()
            .oneshot(post_json("/__offline/update", r#"{"version":"v2"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["registration"]["active"]["version"], "pagcorp-v1");
        assert_eq!(body["registration"]["waiting"]["version"], "pagcorp-v2");
        assert_eq!(body["registration"]["waiting"]["state"], "installed");

        let response = router
            .clone()
            .oneshot(post_json("/__offline/message", r#"{"type":"SKIP_WAITING"}"#))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["activated"], "pagcorp-v2");

        let status = body_json(router.oneshot(get_request("/__offline/status")).await.unwrap()).await;
        assert_eq!(status["registration"]["active"]["version"], "pagcorp-v2");
        assert_eq!(status["registration"]["redundant"]["state"], "redundant");
        assert_eq!(status["controller"], "pagcorp-v2");
    }

    #[tokio::test]
    async fn test_update_with_empty_body_gets_fresh_version() {
        let (router, _network) = setup().await;

        let request = Request::builder()
            .method("POST")
            .uri("/__offline/update")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        let active = body["registration"]["active"]["version"].as_str().unwrap().to_string();
        assert!(active.starts_with("pagcorp-v"));
        assert_ne!(active, "pagcorp-v1");
    }

    #[tokio::test]
    async fn test_update_to_active_version_is_rejected() {
        let (router, _network) = setup().await;

        let response = router
            .oneshot(post_json("/__offline/update", r#"{"version":"v1"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_reports_active_version() {
        let (router, _network) = setup().await;

        let response = router.oneshot(get_request("/__offline/status")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["registration"]["active"]["version"], "pagcorp-v1");
        assert_eq!(body["registration"]["active"]["state"], "activated");
        assert_eq!(body["controller"], "pagcorp-v1");
    }
}
