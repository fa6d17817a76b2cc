//! Configuration types mapping to the provider document.
//!
//! ```jsonc
//! {
//!   "provider": {
//!     "kong": {
//!       "options": {
//!         "baseURL": "https://gateway.example.com/v1",
//!         "oauth": {
//!           "tokenUrl": "https://auth.example.com/oauth2/token",
//!           "clientId": "{env:KONG_CLIENT_ID}",
//!           "clientSecret": "{env:KONG_CLIENT_SECRET}",
//!           "scope": "inference"
//!         }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Every field is optional at parse time so that one incomplete provider does
//! not reject the whole document; [`ProviderConfig::resolve`] is where an entry
//! is validated.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, Result};
use crate::jsonc::strip_comments;
use crate::secrets::{Substituted, substitute_env};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TollgateConfig {
    /// Providers keyed by id, in document order.
    #[serde(rename = "provider")]
    pub providers: IndexMap<String, ProviderConfig>,
}

impl TollgateConfig {
    /// Create an empty config (no providers, every request passes through).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON-with-comments document, substituting `{env:NAME}`
    /// placeholders from the process environment.
    ///
    /// Returns the config and any warnings (unset variables).
    pub fn from_jsonc(text: &str) -> Result<(Self, Vec<String>)> {
        let stripped = strip_comments(text);
        let substituted = substitute_env(&stripped);
        Self::from_substituted(substituted)
    }

    /// Parse an already placeholder-substituted document.
    pub fn from_substituted(substituted: Substituted) -> Result<(Self, Vec<String>)> {
        let config: TollgateConfig = serde_json::from_str(&substituted.text)?;
        let warnings = substituted
            .missing
            .iter()
            .map(|name| format!("unresolved environment variable {}", name))
            .collect();
        Ok((config, warnings))
    }

    /// Iterate providers in document order.
    pub fn providers(&self) -> impl Iterator<Item = (&str, &ProviderConfig)> {
        self.providers.iter().map(|(id, p)| (id.as_str(), p))
    }

    /// Whether no providers are configured.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider entries
// ─────────────────────────────────────────────────────────────────────────────

/// A single provider entry.
///
/// Fields other than `options` (model lists, display names, SDK package
/// names) are accepted and ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Connection options.
    pub options: ProviderOptions,
}

/// Connection options of a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    /// Base URL of the OpenAI-compatible API; also the request-matching prefix.
    #[serde(rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// OAuth client-credentials settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthSettings>,
}

/// Raw OAuth client-credentials settings.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OAuthSettings {
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("scope", &self.scope)
            .finish()
    }
}

impl ProviderConfig {
    /// Validate this entry into a registrable provider.
    ///
    /// Fails with [`ConfigError::Mismatch`] when `baseURL`, `oauth`, or one of
    /// the OAuth fields is missing or empty, and with
    /// [`ConfigError::InvalidUrl`] when the token URL does not parse.
    pub fn resolve(&self, id: &str) -> Result<ResolvedProvider> {
        let mismatch = |reason: &str| ConfigError::Mismatch {
            provider: id.to_string(),
            reason: reason.to_string(),
        };

        let base_url = non_empty(self.options.base_url.as_deref())
            .ok_or_else(|| mismatch("missing baseURL"))?;
        let oauth = self
            .options
            .oauth
            .as_ref()
            .ok_or_else(|| mismatch("missing oauth settings"))?;

        let token_url = non_empty(oauth.token_url.as_deref())
            .ok_or_else(|| mismatch("missing oauth.tokenUrl"))?;
        let client_id = non_empty(oauth.client_id.as_deref())
            .ok_or_else(|| mismatch("missing oauth.clientId"))?;
        let client_secret = non_empty(oauth.client_secret.as_deref())
            .ok_or_else(|| mismatch("missing oauth.clientSecret"))?;

        let token_url = Url::parse(token_url).map_err(|e| ConfigError::InvalidUrl {
            provider: id.to_string(),
            url: token_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(ResolvedProvider {
            id: id.to_string(),
            base_url: base_url.to_string(),
            oauth: ResolvedOAuth {
                token_url,
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
                scope: non_empty(oauth.scope.as_deref()).map(str::to_string),
            },
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolved (validated) provider
// ─────────────────────────────────────────────────────────────────────────────

/// A provider that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub id: String,
    pub base_url: String,
    pub oauth: ResolvedOAuth,
}

/// Validated OAuth client-credentials settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedOAuth {
    pub token_url: Url,
    pub client_id: String,
    pub client_secret: String,
    /// `None` when unset or empty; an empty scope is never sent.
    pub scope: Option<String>,
}

impl fmt::Debug for ResolvedOAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedOAuth")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}
