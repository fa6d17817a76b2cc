//! The host HTTP client and its transport extension point.
//!
//! [`HttpClient`] sends every request through whatever [`Transport`] sits in
//! its slot. Installing the interceptor swaps the slot's content for an
//! [`Interceptor`] wrapping the previous transport; the interceptor sends only
//! through that captured original, never back through the slot.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Method, Request, RequestBuilder, Response};

use crate::error::Result;
use crate::interceptor::Interceptor;
use crate::registry::DestinationRegistry;
use crate::token_manager::SharedTokenManager;

/// Something that can send an HTTP request.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(&self, request: Request) -> Result<Response>;

    /// Whether this transport already authenticates requests.
    fn is_intercepting(&self) -> bool {
        false
    }
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn send(&self, request: Request) -> Result<Response> {
        Ok(self.execute(request).await?)
    }
}

/// Shared transport handle.
pub type SharedTransport = Arc<dyn Transport>;

/// HTTP client whose transport can be wrapped once by the interceptor.
pub struct HttpClient {
    builder: reqwest::Client,
    transport: RwLock<SharedTransport>,
}

impl HttpClient {
    /// Create a client with a default `reqwest` transport.
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Create a client sending through `client`.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            transport: RwLock::new(Arc::new(client.clone())),
            builder: client,
        }
    }

    /// Start building a request. Send it with [`execute`](Self::execute).
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.builder.request(method, url)
    }

    /// Send a request through the installed transport.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let transport = self.transport.read().clone();
        transport.send(request).await
    }

    /// Wrap the current transport with an [`Interceptor`].
    ///
    /// Returns `false` without changing anything if the transport is already
    /// intercepting.
    pub fn install_interceptor(
        &self,
        registry: Arc<DestinationRegistry>,
        tokens: SharedTokenManager,
    ) -> bool {
        let mut slot = self.transport.write();
        if slot.is_intercepting() {
            tracing::debug!("Interceptor already installed; skipping");
            return false;
        }

        let original = slot.clone();
        *slot = Arc::new(Interceptor::new(original, registry, tokens));
        tracing::info!("OAuth interceptor installed");
        true
    }

    /// Whether requests are currently authenticated by an interceptor.
    pub fn is_intercepted(&self) -> bool {
        self.transport.read().is_intercepting()
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("transport", &*self.transport.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_manager::TokenManager;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_execute_without_interceptor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let request = client
            .request(Method::GET, &format!("{}/ping", server.uri()))
            .build()
            .unwrap();
        let response = client.execute(request).await.unwrap();
        assert_eq!(response.status(), 204);
        assert!(!client.is_intercepted());
    }

    #[test]
    fn test_install_is_idempotent() {
        let client = HttpClient::new();
        let registry = Arc::new(DestinationRegistry::new());
        let tokens = Arc::new(TokenManager::new());

        assert!(client.install_interceptor(registry.clone(), tokens.clone()));
        assert!(client.is_intercepted());
        assert!(!client.install_interceptor(registry, tokens));
        assert!(client.is_intercepted());
    }
}
