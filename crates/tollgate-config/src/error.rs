//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading and validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// The document is not valid JSON once comments are removed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A provider entry lacks what is needed to register it.
    #[error("provider '{provider}' is not usable: {reason}")]
    Mismatch { provider: String, reason: String },

    /// A provider's token URL does not parse.
    #[error("provider '{provider}' has an invalid token URL '{url}': {reason}")]
    InvalidUrl {
        provider: String,
        url: String,
        reason: String,
    },
}
