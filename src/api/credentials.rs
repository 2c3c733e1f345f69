//! Credential lifecycle: cached bearer token with single-flight refresh.
//!
//! The cache enforces the freshness invariant (`now < expires_at -
//! safety_margin` at the instant a token is handed out) and serializes
//! refreshes: a proactive renewal tick and a call-time freshness check
//! racing each other must not issue duplicate token exchanges, so the
//! second caller waits on the first and re-reads the cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use super::error::ApiError;

/// A bearer token with its known expiry.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Whether the token is still usable at `now` given the safety margin.
    pub fn is_fresh(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::zero());
        now < self.expires_at - margin
    }
}

/// Performs the client-credentials token exchange.
///
/// Abstracted so the refresh discipline can be exercised without a
/// server; the production implementation posts to `/auth/token`.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self) -> Result<Credential, ApiError>;
}

/// Cached credential guarded by a refresh mutex.
pub struct CredentialCache {
    current: RwLock<Option<Credential>>,
    refresh_lock: Mutex<()>,
    safety_margin: Duration,
}

impl CredentialCache {
    pub fn new(safety_margin: Duration) -> Self {
        Self {
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            safety_margin,
        }
    }

    /// Drop the cached credential. Called when the server answers 401
    /// despite a locally-fresh token.
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }

    /// Whether the proactive renewal task should refresh now.
    pub async fn near_expiry(&self) -> bool {
        match self.current.read().await.as_ref() {
            Some(cred) => !cred.is_fresh(self.safety_margin, Utc::now()),
            None => true,
        }
    }

    /// Return a token satisfying the freshness invariant, refreshing
    /// through `exchanger` first if needed.
    pub async fn fresh_token(&self, exchanger: &dyn TokenExchanger) -> Result<String, ApiError> {
        if let Some(cred) = self.current.read().await.as_ref() {
            if cred.is_fresh(self.safety_margin, Utc::now()) {
                return Ok(cred.access_token.clone());
            }
        }
        self.refresh(exchanger).await.map(|c| c.access_token)
    }

    /// Refresh the credential. Concurrent callers block on the
    /// in-flight exchange and observe its result instead of issuing
    /// their own.
    pub async fn refresh(&self, exchanger: &dyn TokenExchanger) -> Result<Credential, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        // A racing caller may have refreshed while we waited for the lock.
        if let Some(cred) = self.current.read().await.as_ref() {
            if cred.is_fresh(self.safety_margin, Utc::now()) {
                return Ok(cred.clone());
            }
        }

        let cred = exchanger.exchange().await?;
        tracing::info!(
            "Token refreshed, expires at {}",
            cred.expires_at.format("%H:%M:%S")
        );
        *self.current.write().await = Some(cred.clone());
        Ok(cred)
    }
}
