// Network side of the offline cache: where responses come from when not cached
use axum::http::Method;
use std::time::Duration;
use url::Url;

use crate::offline::error::NetworkFetchError;
use crate::offline::storage::StoredResponse;

/// Headers that only make sense for a single hop
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| hop.eq_ignore_ascii_case(name))
}

/// An intercepted request. `url` is absolute and doubles as the cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Path component of the URL, or the raw URL when it does not parse
    pub fn path(&self) -> String {
        Url::parse(&self.url)
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| self.url.clone())
    }
}

/// Anything that can answer a request over the network
#[async_trait::async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<StoredResponse, NetworkFetchError>;
}

/// Network backed by reqwest
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn new(timeout: Duration) -> Result<Self, NetworkFetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkFetchError::Unreachable(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<StoredResponse, NetworkFetchError> {
        let url = Url::parse(&request.url)
            .map_err(|e| NetworkFetchError::InvalidUrl(format!("{}: {}", request.url, e)))?;

        let mut builder = self.client.request(request.method.clone(), url);
        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        tracing::debug!("{} {} -> {}", request.method, request.url, status);
        Ok(StoredResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_path() {
        let request = FetchRequest::get("http://127.0.0.1:3002/api/pedidos?x=1");
        assert_eq!(request.path(), "/api/pedidos");

        let raw = FetchRequest::get("not a url/api/");
        assert_eq!(raw.path(), "not a url/api/");
    }

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(is_hop_by_hop("host"));
        assert!(!is_hop_by_hop("content-type"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let network = HttpNetwork::new(Duration::from_secs(1)).unwrap();
        let result = network.fetch(&FetchRequest::get("::not-a-url::")).await;
        assert!(matches!(result, Err(NetworkFetchError::InvalidUrl(_))));
    }

    async fn spawn_upstream() -> String {
        use axum::{http::HeaderMap, response::IntoResponse, routing::get, Router};

        async fn pedidos(headers: HeaderMap) -> axum::response::Response {
            let client = headers
                .get("x-client")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string();
            (
                [
                    ("content-type", "application/json"),
                    ("x-seen-client", client.as_str()),
                    ("connection", "close"),
                ],
                r#"{"success":true,"data":[]}"#,
            )
                .into_response()
        }

        let app = Router::new().route("/api/pedidos", get(pedidos));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_from_live_upstream() {
        let base = spawn_upstream().await;
        let network = HttpNetwork::new(Duration::from_secs(5)).unwrap();
        let mut request = FetchRequest::get(format!("{}/api/pedidos", base));
        request.headers = vec![
            ("x-client".to_string(), "dashboard".to_string()),
            ("host".to_string(), "ignored.test".to_string()),
        ];

        let response = network.fetch(&request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"success":true,"data":[]}"#.to_vec());
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("x-seen-client"), Some("dashboard"));
        assert!(response.header("connection").is_none());
        assert!(response.header("content-length").is_none());
    }

    #[tokio::test]
    async fn test_live_upstream_missing_route() {
        let base = spawn_upstream().await;
        let network = HttpNetwork::new(Duration::from_secs(5)).unwrap();

        let response = network
            .fetch(&FetchRequest::get(format!("{}/nope", base)))
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_cacheable());
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        let network = HttpNetwork::new(Duration::from_secs(1)).unwrap();
        let result = network.fetch(&FetchRequest::get("http://127.0.0.1:1/")).await;
        assert!(matches!(result, Err(NetworkFetchError::Unreachable(_))));
    }
}
