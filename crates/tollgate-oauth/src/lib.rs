//! OAuth 2.0 client-credentials authentication for outbound requests to
//! OpenAI-compatible gateways.
//!
//! Requests whose URL starts with a registered destination's prefix get an
//! `Authorization` header from a per-destination token cache; everything else
//! passes through untouched.
//!
//! # Components
//!
//! - [`oauth`]: client-credentials grant, token and config types
//! - [`token_manager`]: per-destination cache with single-flight fetching
//! - [`registry`]: destinations built from configuration, prefix matching
//! - [`transport`]: the host client and its once-only interceptor slot
//! - [`interceptor`]: token injection and the single 401 retry
//! - [`proxy`]: Axum-based localhost proxy for external clients

pub mod error;
pub mod interceptor;
pub mod oauth;
pub mod proxy;
pub mod registry;
pub mod token_manager;
pub mod transport;

pub use error::{FetchFailure, OAuthError, Result};
pub use interceptor::Interceptor;
pub use oauth::{OAuthConfig, Token, TokenResponse};
pub use proxy::{ProxyConfig, ProxyServer};
pub use registry::{Destination, DestinationRegistry, SkippedProvider};
pub use token_manager::{
    CacheOutcome, Clock, ManualClock, SharedTokenManager, SystemClock, TokenManager, TokenStatus,
};
pub use transport::{HttpClient, SharedTransport, Transport};
