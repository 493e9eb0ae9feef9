/*!
 * Bearer Token Cache
 * Per-client token storage with refresh serialised under a mutex
 */

use super::types::TokenGrant;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// A cached bearer token with its expiry
#[derive(Debug, Clone)]
pub struct BearerToken {
    pub access: String,
    pub expires_at: Instant,
    pub refresh: Option<String>,
    pub refresh_expires_at: Option<Instant>,
}

impl BearerToken {
    pub fn new(access: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            access: access.into(),
            expires_at: Instant::now() + expires_in,
            refresh: None,
            refresh_expires_at: None,
        }
    }

    pub fn from_grant(grant: TokenGrant) -> Self {
        let now = Instant::now();
        Self {
            access: grant.access_token,
            expires_at: now + Duration::from_secs(grant.expires_in),
            refresh: grant.refresh_token,
            refresh_expires_at: grant
                .refresh_expires_in
                .map(|secs| now + Duration::from_secs(secs)),
        }
    }

    /// Valid for longer than `threshold`
    pub fn is_fresh(&self, threshold: Duration) -> bool {
        Instant::now() + threshold < self.expires_at
    }

    /// Refresh token still usable for longer than `threshold`
    pub fn refresh_token(&self, threshold: Duration) -> Option<&str> {
        let usable = match self.refresh_expires_at {
            Some(at) => Instant::now() + threshold < at,
            None => true,
        };
        self.refresh.as_deref().filter(|_| usable)
    }
}

/// Owned token cache; one per client instance
pub struct TokenCache {
    token: Mutex<Option<BearerToken>>,
    threshold: Duration,
}

impl TokenCache {
    pub fn new(threshold: Duration) -> Self {
        Self {
            token: Mutex::new(None),
            threshold,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Return a fresh access token, obtaining a new one when the cached token
    /// is absent or within the expiry threshold
    ///
    /// `obtain` receives the stale token (if any) so it can use its refresh
    /// token. The lock is held across `obtain`, so concurrent callers wait for
    /// one refresh instead of racing.
    pub async fn bearer<F, Fut, E>(&self, obtain: F) -> Result<String, E>
    where
        F: FnOnce(Option<BearerToken>) -> Fut,
        Fut: Future<Output = Result<BearerToken, E>>,
    {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.is_fresh(self.threshold) {
                return Ok(token.access.clone());
            }
        }

        debug!("Bearer token absent or expiring, requesting a new one");
        let fresh = obtain(guard.take()).await?;
        let access = fresh.access.clone();
        *guard = Some(fresh);
        Ok(access)
    }

    /// Drop the cached token, e.g. after the server rejected it
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }
}
