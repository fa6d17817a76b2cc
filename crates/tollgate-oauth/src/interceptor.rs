//! Request interception: destination matching, token injection, and the
//! single 401 retry.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Request, Response, StatusCode};

use crate::error::{OAuthError, Result};
use crate::oauth::Token;
use crate::registry::{Destination, DestinationRegistry};
use crate::token_manager::{CacheOutcome, SharedTokenManager};
use crate::transport::{SharedTransport, Transport};

/// Authenticates requests bound for registered destinations.
///
/// Requests that match no destination are forwarded untouched.
#[derive(Debug, Clone)]
pub struct Interceptor {
    original: SharedTransport,
    registry: Arc<DestinationRegistry>,
    tokens: SharedTokenManager,
}

impl Interceptor {
    /// Wrap `original`. All sends, including retries, go through it.
    pub fn new(
        original: SharedTransport,
        registry: Arc<DestinationRegistry>,
        tokens: SharedTokenManager,
    ) -> Self {
        Self {
            original,
            registry,
            tokens,
        }
    }

    pub fn registry(&self) -> &DestinationRegistry {
        &self.registry
    }

    /// Send `request`, authenticating it if it targets a destination.
    ///
    /// On a 401 the cached token is invalidated, a fresh one fetched, and the
    /// request sent once more; the second response is returned whatever its
    /// status. Requests with a streaming body cannot be replayed, so their 401
    /// is returned as-is.
    pub async fn dispatch(&self, request: Request) -> Result<Response> {
        let Some(destination) = self.registry.match_url(request.url().as_str()) else {
            return self.original.send(request).await;
        };

        let mut attempt = Attempt::default();
        let result = self.dispatch_to(destination, request, &mut attempt).await;
        trace_dispatch(destination, &attempt, &result);
        result
    }

    async fn dispatch_to(
        &self,
        destination: &Destination,
        mut request: Request,
        attempt: &mut Attempt,
    ) -> Result<Response> {
        let (token, cache) = self
            .tokens
            .acquire_with_outcome(&destination.id, &destination.oauth)
            .await?;
        attempt.cache = Some(cache);

        let replay = request.try_clone();
        authorize(&mut request, destination, &token)?;
        let response = self.send_original(destination, request).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(mut replay) = replay else {
            tracing::warn!(
                destination = %destination.id,
                "Request body cannot be replayed; returning 401 without retry"
            );
            return Ok(response);
        };

        tracing::debug!(destination = %destination.id, "Got 401; refreshing token and retrying once");
        attempt.retried = true;
        self.tokens.invalidate(&destination.id);
        let (token, cache) = self
            .tokens
            .acquire_with_outcome(&destination.id, &destination.oauth)
            .await?;
        attempt.cache = Some(cache);

        authorize(&mut replay, destination, &token)?;
        self.send_original(destination, replay).await
    }

    /// Send through the original transport, tagging failures with the
    /// destination.
    async fn send_original(
        &self,
        destination: &Destination,
        request: Request,
    ) -> Result<Response> {
        self.original
            .send(request)
            .await
            .map_err(|e| OAuthError::dispatch(&destination.id, e))
    }
}

#[async_trait]
impl Transport for Interceptor {
    async fn send(&self, request: Request) -> Result<Response> {
        self.dispatch(request).await
    }

    fn is_intercepting(&self) -> bool {
        true
    }
}

/// What happened during one authenticated dispatch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Attempt {
    /// Outcome of the most recent token acquisition; `None` if it failed.
    cache: Option<CacheOutcome>,
    retried: bool,
}

/// Set `Authorization: <token_type> <access_token>`, replacing any existing
/// value.
fn authorize(request: &mut Request, destination: &Destination, token: &Token) -> Result<()> {
    let mut value =
        HeaderValue::from_str(&token.authorization()).map_err(|e| OAuthError::InvalidHeader {
            destination: destination.id.clone(),
            reason: e.to_string(),
        })?;
    value.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}

fn trace_dispatch(destination: &Destination, attempt: &Attempt, result: &Result<Response>) {
    let cache = attempt.cache.map_or("failed", |c| c.as_str());
    match result {
        Ok(response) => tracing::debug!(
            destination = %destination.id,
            cache,
            retried = attempt.retried,
            status = response.status().as_u16(),
            "Dispatched authenticated request"
        ),
        Err(e) => tracing::warn!(
            destination = %destination.id,
            cache,
            retried = attempt.retried,
            error = %e,
            "Authenticated request failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::OAuthConfig;
    use crate::token_manager::TokenManager;
    use parking_lot::Mutex;
    use reqwest::header::HeaderMap;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records request headers and answers with queued statuses (200 once
    /// the queue is empty).
    #[derive(Debug, Default)]
    struct RecordingTransport {
        seen: Mutex<Vec<HeaderMap>>,
        statuses: Mutex<Vec<u16>>,
    }

    impl RecordingTransport {
        fn answering(statuses: &[u16]) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                statuses: Mutex::new(statuses.iter().rev().copied().collect()),
            }
        }

        fn authorizations(&self) -> Vec<Option<String>> {
            self.seen
                .lock()
                .iter()
                .map(|h| {
                    h.get(AUTHORIZATION)
                        .map(|v| v.to_str().unwrap().to_string())
                })
                .collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, request: Request) -> Result<Response> {
            self.seen.lock().push(request.headers().clone());
            let status = self.statuses.lock().pop().unwrap_or(200);
            let response = axum::http::Response::builder()
                .status(status)
                .body("upstream")
                .unwrap();
            Ok(Response::from(response))
        }
    }

    async fn token_server(expected: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "tok1", "expires_in": 3600})),
            )
            .expect(expected)
            .mount(&server)
            .await;
        server
    }

    fn interceptor(server: &MockServer, transport: Arc<RecordingTransport>) -> Interceptor {
        let mut registry = DestinationRegistry::new();
        registry
            .register(Destination::new(
                "kong",
                "https://api.example.com/v1",
                OAuthConfig::new(
                    Url::parse(&format!("{}/token", server.uri())).unwrap(),
                    "id",
                    "secret",
                ),
            ))
            .unwrap();
        Interceptor::new(
            transport,
            Arc::new(registry),
            Arc::new(TokenManager::with_client(reqwest::Client::new())),
        )
    }

    fn get(url: &str) -> Request {
        reqwest::Client::new()
            .get(url)
            .header("x-trace", "abc")
            .header(AUTHORIZATION, "Bearer caller-key")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_unmatched_request_passes_through_untouched() {
        let server = token_server(0).await;
        let transport = Arc::new(RecordingTransport::default());
        let interceptor = interceptor(&server, transport.clone());

        let request = get("https://other.example.com/v1/models");
        let expected = request.headers().clone();
        let response = interceptor.dispatch(request).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(transport.seen.lock().as_slice(), &[expected]);
    }

    #[tokio::test]
    async fn test_matched_request_gets_token_and_keeps_other_headers() {
        let server = token_server(1).await;
        let transport = Arc::new(RecordingTransport::default());
        let interceptor = interceptor(&server, transport.clone());

        interceptor
            .dispatch(get("https://api.example.com/v1/models"))
            .await
            .unwrap();

        let seen = transport.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get(AUTHORIZATION).unwrap(), "Bearer tok1");
        assert_eq!(seen[0].get("x-trace").unwrap(), "abc");
        assert_eq!(seen[0].get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[tokio::test]
    async fn test_single_401_is_retried_once() {
        let server = token_server(2).await;
        let transport = Arc::new(RecordingTransport::answering(&[401, 200]));
        let interceptor = interceptor(&server, transport.clone());

        let response = interceptor
            .dispatch(get("https://api.example.com/v1/chat/completions"))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            transport.authorizations(),
            vec![Some("Bearer tok1".to_string()), Some("Bearer tok1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_second_401_is_returned() {
        let server = token_server(2).await;
        let transport = Arc::new(RecordingTransport::answering(&[401, 401, 200]));
        let interceptor = interceptor(&server, transport.clone());

        let response = interceptor
            .dispatch(get("https://api.example.com/v1/models"))
            .await
            .unwrap();

        assert_eq!(response.status(), 401);
        assert_eq!(transport.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let server = token_server(1).await;
        let transport = Arc::new(RecordingTransport::answering(&[403]));
        let interceptor = interceptor(&server, transport.clone());

        let response = interceptor
            .dispatch(get("https://api.example.com/v1/models"))
            .await
            .unwrap();

        assert_eq!(response.status(), 403);
        assert_eq!(transport.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_token_failure_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_client"))
            .mount(&server)
            .await;
        let transport = Arc::new(RecordingTransport::default());
        let interceptor = interceptor(&server, transport.clone());

        let err = interceptor
            .dispatch(get("https://api.example.com/v1/models"))
            .await
            .unwrap_err();

        assert_eq!(err.destination(), Some("kong"));
        assert_eq!(err.fetch_status(), Some(400));
        assert!(transport.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_after_401_replaces_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "t"})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;
        let transport = Arc::new(RecordingTransport::answering(&[401]));
        let interceptor = interceptor(&server, transport.clone());

        let err = interceptor
            .dispatch(get("https://api.example.com/v1/models"))
            .await
            .unwrap_err();

        assert_eq!(err.fetch_status(), Some(500));
        assert_eq!(transport.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_destination_error_names_destination() {
        let server = token_server(1).await;
        let mut registry = DestinationRegistry::new();
        registry
            .register(Destination::new(
                "kong",
                "http://127.0.0.1:9/v1",
                OAuthConfig::new(
                    Url::parse(&format!("{}/token", server.uri())).unwrap(),
                    "id",
                    "secret",
                ),
            ))
            .unwrap();
        let interceptor = Interceptor::new(
            Arc::new(reqwest::Client::new()),
            Arc::new(registry),
            Arc::new(TokenManager::with_client(reqwest::Client::new())),
        );

        let err = interceptor
            .dispatch(get("http://127.0.0.1:9/v1/models"))
            .await
            .unwrap_err();

        assert!(matches!(err, OAuthError::Dispatch { .. }), "{:?}", err);
        assert_eq!(err.destination(), Some("kong"));
        assert!(err.to_string().contains("127.0.0.1:9"));
    }

    #[tokio::test]
    async fn test_attempt_records_refresh_outcome() {
        let server = token_server(2).await;
        let transport = Arc::new(RecordingTransport::answering(&[401, 200]));
        let interceptor = interceptor(&server, transport.clone());
        let destination = interceptor.registry.get("kong").unwrap().clone();

        let mut attempt = Attempt::default();
        let result = interceptor
            .dispatch_to(
                &destination,
                get("https://api.example.com/v1/models"),
                &mut attempt,
            )
            .await;

        assert_eq!(result.unwrap().status(), 200);
        assert_eq!(
            attempt,
            Attempt {
                cache: Some(CacheOutcome::Miss),
                retried: true,
            }
        );
    }

    #[tokio::test]
    async fn test_attempt_records_failed_acquire() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let transport = Arc::new(RecordingTransport::default());
        let interceptor = interceptor(&server, transport.clone());
        let destination = interceptor.registry.get("kong").unwrap().clone();

        let mut attempt = Attempt::default();
        let result = interceptor
            .dispatch_to(
                &destination,
                get("https://api.example.com/v1/models"),
                &mut attempt,
            )
            .await;

        assert_eq!(result.unwrap_err().fetch_status(), Some(503));
        assert_eq!(attempt, Attempt::default());
        assert!(transport.seen.lock().is_empty());
    }

    #[test]
    fn test_interceptor_reports_intercepting() {
        let interceptor = Interceptor::new(
            Arc::new(RecordingTransport::default()),
            Arc::new(DestinationRegistry::new()),
            Arc::new(TokenManager::new()),
        );
        assert!(interceptor.is_intercepting());
    }
}
