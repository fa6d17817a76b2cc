//! Error types for token acquisition and request dispatch.

use std::fmt;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Errors that can occur while authenticating and dispatching requests.
///
/// Cloneable so that a single failed token fetch can be handed to every
/// caller that joined it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OAuthError {
    /// The token endpoint could not be reached or rejected the credentials.
    #[error("token fetch for '{destination}' failed: {cause}")]
    TokenFetchFailed {
        destination: String,
        cause: FetchFailure,
    },

    /// The token could not be turned into an `Authorization` header.
    #[error("invalid authorization header for '{destination}': {reason}")]
    InvalidHeader { destination: String, reason: String },

    /// An authenticated request to a destination could not be delivered.
    #[error("request to '{destination}' failed: {cause}")]
    Dispatch { destination: String, cause: String },

    /// No registered destination has this id.
    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    /// Network/HTTP error from the underlying transport.
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

/// Why a token fetch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The issuer answered with a non-success status.
    Rejected { status: u16, body: String },
    /// DNS, connect, timeout, or an unparseable response body.
    Transport(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Rejected { status, body } => {
                write!(f, "token endpoint returned HTTP {}: {}", status, body)
            }
            FetchFailure::Transport(cause) => write!(f, "{}", cause),
        }
    }
}

impl OAuthError {
    /// Destination the error relates to, if any.
    pub fn destination(&self) -> Option<&str> {
        match self {
            OAuthError::TokenFetchFailed { destination, .. }
            | OAuthError::InvalidHeader { destination, .. }
            | OAuthError::Dispatch { destination, .. } => Some(destination),
            OAuthError::UnknownDestination(id) => Some(id),
            _ => None,
        }
    }

    /// HTTP status returned by the token endpoint, for rejected fetches.
    pub fn fetch_status(&self) -> Option<u16> {
        match self {
            OAuthError::TokenFetchFailed {
                cause: FetchFailure::Rejected { status, .. },
                ..
            } => Some(*status),
            _ => None,
        }
    }

    /// Attach `destination` to a transport failure on an authenticated send.
    pub(crate) fn dispatch(destination: &str, err: OAuthError) -> Self {
        let cause = match err {
            OAuthError::Network(cause) => cause,
            other => other.to_string(),
        };
        OAuthError::Dispatch {
            destination: destination.to_string(),
            cause,
        }
    }

    pub(crate) fn fetch(destination: &str, cause: FetchFailure) -> Self {
        OAuthError::TokenFetchFailed {
            destination: destination.to_string(),
            cause,
        }
    }
}

impl From<reqwest::Error> for OAuthError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest's Display omits the underlying cause (refused, DNS, timeout).
        let mut message = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        OAuthError::Network(message)
    }
}
