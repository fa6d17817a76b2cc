//! Registered OAuth-protected destinations.

use tollgate_config::TollgateConfig;

use crate::error::{OAuthError, Result};
use crate::oauth::OAuthConfig;

/// An OAuth-protected target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Provider id from configuration.
    pub id: String,
    /// A request is for this destination iff its URL starts with this.
    pub url_prefix: String,
    pub oauth: OAuthConfig,
}

impl Destination {
    pub fn new(id: impl Into<String>, url_prefix: impl Into<String>, oauth: OAuthConfig) -> Self {
        Self {
            id: id.into(),
            url_prefix: url_prefix.into(),
            oauth,
        }
    }

    /// Plain string-prefix match against the full request URL.
    pub fn matches(&self, url: &str) -> bool {
        url.starts_with(&self.url_prefix)
    }
}

/// A provider entry that was not registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedProvider {
    pub id: String,
    pub reason: String,
}

/// Ordered, read-only set of destinations.
///
/// Built once at startup. When prefixes overlap, the destination registered
/// first wins.
#[derive(Debug, Clone, Default)]
pub struct DestinationRegistry {
    destinations: Vec<Destination>,
    skipped: Vec<SkippedProvider>,
}

impl DestinationRegistry {
    /// Create an empty registry (every request passes through).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every usable provider of `config`, in document order.
    ///
    /// Entries missing `baseURL` or OAuth settings, and duplicate ids, are
    /// skipped with a warning and recorded in [`skipped`](Self::skipped).
    pub fn from_config(config: &TollgateConfig) -> Self {
        let mut registry = Self::new();

        for (id, provider) in config.providers() {
            let resolved = match provider.resolve(id) {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::warn!(provider = id, error = %e, "Skipping provider");
                    registry.skipped.push(SkippedProvider {
                        id: id.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let destination = Destination::new(resolved.id, resolved.base_url, resolved.oauth.into());
            if let Err(e) = registry.register(destination) {
                tracing::warn!(provider = id, error = %e, "Skipping provider");
                registry.skipped.push(SkippedProvider {
                    id: id.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        tracing::debug!(
            registered = registry.len(),
            skipped = registry.skipped.len(),
            "Destination registry built"
        );
        registry
    }

    /// Add a destination. Ids must be unique.
    pub fn register(&mut self, destination: Destination) -> Result<()> {
        if self.get(&destination.id).is_some() {
            return Err(OAuthError::Config(format!(
                "duplicate destination id '{}'",
                destination.id
            )));
        }
        if let Some(existing) = self
            .destinations
            .iter()
            .find(|d| destination.url_prefix.starts_with(&d.url_prefix))
        {
            tracing::warn!(
                destination = %destination.id,
                shadowed_by = %existing.id,
                "URL prefix overlaps an earlier destination; the earlier one wins"
            );
        }
        self.destinations.push(destination);
        Ok(())
    }

    /// First registered destination whose prefix matches `url`.
    pub fn match_url(&self, url: &str) -> Option<&Destination> {
        self.destinations.iter().find(|d| d.matches(url))
    }

    /// Destination by id.
    pub fn get(&self, id: &str) -> Option<&Destination> {
        self.destinations.iter().find(|d| d.id == id)
    }

    /// Destinations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Destination> {
        self.destinations.iter()
    }

    /// Providers from configuration that were not registered.
    pub fn skipped(&self) -> &[SkippedProvider] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn oauth() -> OAuthConfig {
        OAuthConfig::new(
            Url::parse("https://auth.example.com/token").unwrap(),
            "id",
            "secret",
        )
    }

    #[test]
    fn test_prefix_matching() {
        let d = Destination::new("kong", "https://api.example.com/v1", oauth());
        assert!(d.matches("https://api.example.com/v1/models"));
        assert!(d.matches("https://api.example.com/v1"));
        assert!(!d.matches("https://api.example.com/v2/models"));
        assert!(!d.matches("http://api.example.com/v1/models"));
    }

    #[test]
    fn test_first_registered_wins() {
        let mut registry = DestinationRegistry::new();
        registry
            .register(Destination::new("broad", "https://api.example.com", oauth()))
            .unwrap();
        registry
            .register(Destination::new("narrow", "https://api.example.com/v1", oauth()))
            .unwrap();

        let hit = registry.match_url("https://api.example.com/v1/chat/completions");
        assert_eq!(hit.map(|d| d.id.as_str()), Some("broad"));
    }

    #[test]
    fn test_no_match() {
        let mut registry = DestinationRegistry::new();
        registry
            .register(Destination::new("kong", "https://api.example.com/v1", oauth()))
            .unwrap();
        assert!(registry.match_url("https://elsewhere.example.com/v1").is_none());
        assert!(DestinationRegistry::new().match_url("https://api.example.com/v1").is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = DestinationRegistry::new();
        registry
            .register(Destination::new("kong", "https://a.example.com", oauth()))
            .unwrap();
        let err = registry
            .register(Destination::new("kong", "https://b.example.com", oauth()))
            .unwrap_err();
        assert!(matches!(err, OAuthError::Config(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_from_config_skips_incomplete_providers() {
        let (config, _) = TollgateConfig::from_jsonc(
            r#"{
              "provider": {
                "plain": { "options": { "baseURL": "http://localhost:11434/v1" } },
                "kong": {
                  "options": {
                    "baseURL": "https://gateway.example.com/v1",
                    "oauth": {
                      "tokenUrl": "https://auth.example.com/token",
                      "clientId": "id",
                      "clientSecret": "secret",
                      "scope": "inference"
                    }
                  }
                },
                "noprefix": {
                  "options": {
                    "oauth": {
                      "tokenUrl": "https://auth.example.com/token",
                      "clientId": "id",
                      "clientSecret": "secret"
                    }
                  }
                }
              }
            }"#,
        )
        .unwrap();

        let registry = DestinationRegistry::from_config(&config);
        assert_eq!(registry.len(), 1);

        let kong = registry.get("kong").unwrap();
        assert_eq!(kong.url_prefix, "https://gateway.example.com/v1");
        assert_eq!(kong.oauth.scope.as_deref(), Some("inference"));

        let skipped: Vec<&str> = registry.skipped().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(skipped, vec!["plain", "noprefix"]);
    }

    #[test]
    fn test_from_empty_config() {
        let registry = DestinationRegistry::from_config(&TollgateConfig::new());
        assert!(registry.is_empty());
        assert!(registry.skipped().is_empty());
    }
}
