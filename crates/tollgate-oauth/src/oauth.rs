//! OAuth 2.0 client-credentials grant.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer};
use url::Url;

use crate::error::{FetchFailure, OAuthError, Result};

/// Token type assumed when the issuer omits `token_type`.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Lifetime assumed when the issuer omits `expires_in` (seconds).
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// A token is only handed out while it has more than this left to live.
pub const EXPIRY_MARGIN: TimeDelta = TimeDelta::seconds(60);

/// Client-credentials settings for one destination.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    pub token_url: Url,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
}

impl OAuthConfig {
    /// Create a config without a scope.
    pub fn new(
        token_url: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: None,
        }
    }

    /// Request a scope with every token fetch.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Form fields of the token request. `scope` is only present when set.
    pub fn form_params(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if let Some(scope) = &self.scope {
            params.push(("scope", scope.as_str()));
        }
        params
    }
}

impl From<tollgate_config::ResolvedOAuth> for OAuthConfig {
    fn from(resolved: tollgate_config::ResolvedOAuth) -> Self {
        Self {
            token_url: resolved.token_url,
            client_id: resolved.client_id,
            client_secret: resolved.client_secret,
            scope: resolved.scope,
        }
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

/// An access token obtained from a destination's token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// Build a token from an issuer response received at `issued_at`.
    pub fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        let lifetime_secs = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let lifetime = i64::try_from(lifetime_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            access_token: response.access_token,
            token_type: response
                .token_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            expires_at,
        }
    }

    /// Whether the token is usable at `now`, i.e. expires more than
    /// [`EXPIRY_MARGIN`] from now.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        match now.checked_add_signed(EXPIRY_MARGIN) {
            Some(deadline) => self.expires_at > deadline,
            None => false,
        }
    }

    /// Value of the `Authorization` header for this token.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token endpoint response body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<u64>,
}

/// Accept `expires_in` as a number or a numeric string; some gateways send
/// `"3600"`.
fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Int(u64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Seconds>::deserialize(deserializer)? {
        None => None,
        Some(Seconds::Int(n)) => Some(n),
        Some(Seconds::Float(f)) if f.is_finite() && f >= 0.0 => Some(f as u64),
        Some(Seconds::Float(_)) => Some(0),
        Some(Seconds::Text(s)) => s.trim().parse().ok(),
    })
}

/// Perform a client-credentials grant against `config.token_url`.
///
/// `now` is called once the response arrives; the token's lifetime counts
/// from that instant. Any non-2xx status is a hard failure.
pub async fn request_token(
    client: &reqwest::Client,
    destination: &str,
    config: &OAuthConfig,
    now: impl FnOnce() -> DateTime<Utc>,
) -> Result<Token> {
    let response = client
        .post(config.token_url.clone())
        .form(&config.form_params())
        .send()
        .await
        .map_err(|e| {
            OAuthError::fetch(
                destination,
                FetchFailure::Transport(format!("token request failed: {}", e)),
            )
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        return Err(OAuthError::fetch(
            destination,
            FetchFailure::Rejected {
                status: status.as_u16(),
                body,
            },
        ));
    }

    let body = response.text().await.map_err(|e| {
        OAuthError::fetch(
            destination,
            FetchFailure::Transport(format!("failed to read token response: {}", e)),
        )
    })?;
    let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
        OAuthError::fetch(
            destination,
            FetchFailure::Transport(format!("invalid token response: {}", e)),
        )
    })?;

    Ok(Token::from_response(parsed, now()))
}
