//! Localhost reverse proxy in front of the registered destinations.
//!
//! Lets clients that cannot embed the interceptor (other languages, curl)
//! reach OAuth-protected gateways: `/{provider}/{*path}` is forwarded to
//! `<baseURL>/<path>` through the intercepting [`HttpClient`].

use axum::{
    Json, Router as AxumRouter,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::{any, get},
};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::error::OAuthError;
use crate::registry::DestinationRegistry;
use crate::transport::HttpClient;

/// Default bind address of the proxy.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:4180";

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "host",
    "content-length",
    "transfer-encoding",
    "keep-alive",
    "te",
    "trailer",
    "upgrade",
    "proxy-authorization",
    "proxy-authenticate",
];

/// Configuration for the proxy server.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind_addr: SocketAddr,
    pub enable_cors: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 4180)),
            enable_cors: true,
        }
    }
}

impl ProxyConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }
}

/// Shared state for the proxy server.
struct ProxyState {
    client: Arc<HttpClient>,
    registry: Arc<DestinationRegistry>,
}

/// The OAuth proxy server.
pub struct ProxyServer {
    config: ProxyConfig,
    state: Arc<ProxyState>,
}

impl ProxyServer {
    /// Create a proxy forwarding through `client`, which should already have
    /// the interceptor installed.
    pub fn new(
        config: ProxyConfig,
        client: Arc<HttpClient>,
        registry: Arc<DestinationRegistry>,
    ) -> Self {
        Self {
            state: Arc::new(ProxyState { client, registry }),
            config,
        }
    }

    /// Build the axum router.
    pub fn router(&self) -> AxumRouter {
        let mut router = AxumRouter::new()
            .route("/health", get(handle_health))
            .route("/{provider}/{*path}", any(handle_forward))
            .with_state(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        router
    }

    /// Serve until `shutdown` resolves, then stop accepting connections and
    /// let in-flight requests finish.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Starting OAuth proxy server");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!(addr = %local_addr, "OAuth proxy server stopped");
        Ok(())
    }
}

/// Handle ANY /{provider}/{*path}
async fn handle_forward(
    State(state): State<Arc<ProxyState>>,
    Path((provider, path)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<axum::response::Response, ProxyError> {
    let destination = state
        .registry
        .get(&provider)
        .ok_or_else(|| OAuthError::UnknownDestination(provider.clone()))?;

    let mut url = format!(
        "{}/{}",
        destination.url_prefix.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    if let Some(query) = uri.query() {
        url.push('?');
        url.push_str(query);
    }

    let mut forward_headers = headers;
    for name in HOP_BY_HOP {
        forward_headers.remove(*name);
    }

    let request = state
        .client
        .request(method, &url)
        .headers(forward_headers)
        .body(body)
        .build()
        .map_err(|e| OAuthError::InvalidRequest(format!("Cannot build upstream request: {}", e)))?;

    let upstream = state.client.execute(request).await?;

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    for name in HOP_BY_HOP {
        response_headers.remove(*name);
    }

    let stream = upstream
        .bytes_stream()
        .map(|result| result.map_err(std::io::Error::other));

    let mut response = axum::response::Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

/// Handle GET /health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "tollgate-proxy"
    }))
}

/// Error type for proxy responses.
#[derive(Debug)]
pub struct ProxyError(OAuthError);

impl From<OAuthError> for ProxyError {
    fn from(err: OAuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type) = match &self.0 {
            OAuthError::UnknownDestination(_) => (StatusCode::NOT_FOUND, "unknown_provider"),
            OAuthError::TokenFetchFailed { .. } => (StatusCode::BAD_GATEWAY, "token_fetch_failed"),
            OAuthError::InvalidHeader { .. } => (StatusCode::BAD_GATEWAY, "invalid_token"),
            OAuthError::Dispatch { .. } => (StatusCode::BAD_GATEWAY, "upstream_unreachable"),
            OAuthError::Network(_) => (StatusCode::BAD_GATEWAY, "network_error"),
            OAuthError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            OAuthError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
        };

        tracing::warn!(error = %self.0, status = status.as_u16(), "Proxy request failed");

        let body = serde_json::json!({
            "type": "error",
            "error": {
                "type": error_type,
                "message": self.0.to_string(),
                "provider": self.0.destination(),
            }
        });

        (status, Json(body)).into_response()
    }
}
