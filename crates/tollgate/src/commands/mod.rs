//! CLI command handlers.

pub mod providers;
pub mod request;
pub mod serve;
pub mod token;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tollgate_config::LoadedConfig;
use tollgate_oauth::{DestinationRegistry, HttpClient, TokenManager};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, bypassing discovery.
    pub config_path: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Everything a command needs to talk to the configured gateways.
pub struct Runtime {
    pub loaded: LoadedConfig,
    pub registry: Arc<DestinationRegistry>,
    pub tokens: Arc<TokenManager>,
}

impl Context {
    /// Load configuration and build the destination registry.
    pub fn load(&self) -> Result<Runtime> {
        let loaded = tollgate_config::load_config(self.config_path.as_deref(), None)
            .context("Failed to load configuration")?;

        for warning in &loaded.warnings {
            tracing::warn!("{}", warning);
        }
        match &loaded.source {
            Some(path) => tracing::debug!(path = %path.display(), "Loaded configuration"),
            None => tracing::debug!("No configuration file found; all requests pass through"),
        }

        let registry = Arc::new(DestinationRegistry::from_config(&loaded.config));
        Ok(Runtime {
            loaded,
            registry,
            tokens: Arc::new(TokenManager::new()),
        })
    }
}

impl Runtime {
    /// A host client with the interceptor installed.
    pub fn client(&self) -> Arc<HttpClient> {
        let client = Arc::new(HttpClient::new());
        client.install_interceptor(self.registry.clone(), self.tokens.clone());
        client
    }
}
