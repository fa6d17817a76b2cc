//! Per-destination token cache with single-flight fetching.
//!
//! Each destination owns a cache slot holding the last good token and, while
//! a fetch is running, a shared handle to that fetch. The check of the slot
//! and the installation of a new fetch happen under one lock acquisition, so
//! concurrent callers for the same destination either hit the cache, join the
//! running fetch, or (exactly one of them) start it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::error::{FetchFailure, OAuthError, Result};
use crate::oauth::{OAuthConfig, Token, request_token};

/// Timeout applied to token endpoint calls by the default client.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Clock
// ============================================================================

/// Source of the current time, injectable for expiry tests.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ============================================================================
// Cache
// ============================================================================

type SharedFetch = Shared<BoxFuture<'static, Result<Token>>>;

/// Cache slot for one destination.
#[derive(Default)]
struct CacheEntry {
    current: Option<Token>,
    pending: Option<SharedFetch>,
}

type Entries = Arc<Mutex<HashMap<String, CacheEntry>>>;

/// How a token was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// A fresh cached token was returned without a network call.
    Hit,
    /// This caller started a token fetch.
    Miss,
    /// This caller awaited a fetch started by someone else.
    Joined,
}

impl CacheOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Joined => "joined",
        }
    }
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a destination's cache slot, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub cached: bool,
    pub fresh: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub fetch_pending: bool,
}

impl TokenStatus {
    pub fn expires_in_display(&self, now: DateTime<Utc>) -> String {
        match self.expires_at {
            None => "no token".to_string(),
            Some(at) if !self.fresh => {
                if at > now {
                    "Expiring (will refresh on next use)".to_string()
                } else {
                    "Expired (will refresh on next use)".to_string()
                }
            }
            Some(at) => {
                let secs = (at - now).num_seconds().max(0);
                format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
            }
        }
    }
}

// ============================================================================
// TokenManager
// ============================================================================

/// Produces currently-valid tokens per destination.
pub struct TokenManager {
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
    entries: Entries,
}

impl TokenManager {
    /// Create a manager with a default HTTP client and the system clock.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(client)
    }

    /// Create a manager that fetches tokens with `client`.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            clock: Arc::new(SystemClock),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Replace the clock used for freshness checks and expiry computation.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get a token for `destination`, fetching one if the cache has none
    /// that is fresh.
    pub async fn acquire(&self, destination: &str, config: &OAuthConfig) -> Result<Token> {
        self.acquire_with_outcome(destination, config)
            .await
            .map(|(token, _)| token)
    }

    /// Like [`acquire`](Self::acquire), also reporting how the token was
    /// obtained.
    pub async fn acquire_with_outcome(
        &self,
        destination: &str,
        config: &OAuthConfig,
    ) -> Result<(Token, CacheOutcome)> {
        let (fetch, outcome) = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(destination.to_string()).or_default();

            if let Some(token) = entry
                .current
                .as_ref()
                .filter(|t| t.is_fresh_at(self.clock.now()))
            {
                return Ok((token.clone(), CacheOutcome::Hit));
            }

            match &entry.pending {
                Some(pending) => (pending.clone(), CacheOutcome::Joined),
                None => {
                    let fetch = self.start_fetch(destination, config);
                    entry.pending = Some(fetch.clone());
                    (fetch, CacheOutcome::Miss)
                }
            }
        };

        tracing::trace!(destination, cache = %outcome, "Awaiting token fetch");
        fetch.await.map(|token| (token, outcome))
    }

    /// Drop the cached token for `destination`. A fetch already in flight is
    /// left running and will still populate the cache.
    pub fn invalidate(&self, destination: &str) {
        if let Some(entry) = self.entries.lock().get_mut(destination)
            && entry.current.take().is_some()
        {
            tracing::debug!(destination, "Cached token invalidated");
        }
    }

    /// Snapshot of the cache slot for `destination`.
    pub fn status(&self, destination: &str) -> TokenStatus {
        let now = self.clock.now();
        let entries = self.entries.lock();
        match entries.get(destination) {
            Some(entry) => TokenStatus {
                cached: entry.current.is_some(),
                fresh: entry.current.as_ref().is_some_and(|t| t.is_fresh_at(now)),
                expires_at: entry.current.as_ref().map(|t| t.expires_at),
                fetch_pending: entry.pending.is_some(),
            },
            None => TokenStatus {
                cached: false,
                fresh: false,
                expires_at: None,
                fetch_pending: false,
            },
        }
    }

    /// Current time according to this manager's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Spawn the fetch and return a handle every caller can await.
    ///
    /// Called with the entries lock held. The spawned task stores the result
    /// and clears the pending marker itself, so the fetch completes and the
    /// slot is settled even if every waiter goes away.
    fn start_fetch(&self, destination: &str, config: &OAuthConfig) -> SharedFetch {
        let client = self.client.clone();
        let clock = self.clock.clone();
        let entries = self.entries.clone();
        let config = config.clone();
        let id = destination.to_string();

        tracing::debug!(destination, token_url = %config.token_url, "Fetching token");

        let task = tokio::spawn(async move {
            let result = request_token(&client, &id, &config, || clock.now()).await;

            let mut entries = entries.lock();
            let entry = entries.entry(id.clone()).or_default();
            entry.pending = None;
            match &result {
                Ok(token) => {
                    tracing::debug!(destination = %id, expires_at = %token.expires_at, "Token fetched");
                    entry.current = Some(token.clone());
                }
                Err(e) => {
                    tracing::warn!(destination = %id, error = %e, "Token fetch failed");
                }
            }
            result
        });

        let id = destination.to_string();
        async move {
            task.await.unwrap_or_else(|e| {
                Err(OAuthError::fetch(
                    &id,
                    FetchFailure::Transport(format!("token fetch task failed: {}", e)),
                ))
            })
        }
        .boxed()
        .shared()
    }
}

impl Default for TokenManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let destinations = self.entries.lock().len();
        f.debug_struct("TokenManager")
            .field("clock", &self.clock)
            .field("destinations", &destinations)
            .finish()
    }
}

/// Shared token manager for use across async contexts.
pub type SharedTokenManager = Arc<TokenManager>;
