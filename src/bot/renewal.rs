//! Proactive credential renewal loop.
//!
//! Refreshes the token a fixed margin before its known expiry,
//! independent of traffic. A failed refresh is logged and left to the
//! API client's call-time freshness check, which forces a synchronous
//! retry on next use; the refresh mutex in the credential cache keeps
//! the two triggers from issuing duplicate exchanges.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::api::ApiClient;

pub struct RenewalTask {
    api: Arc<ApiClient>,
    check_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl RenewalTask {
    pub fn new(api: Arc<ApiClient>, check_interval: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            api,
            check_interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "Renewal task started (checking every {:?})",
            self.check_interval
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {}
                _ = self.shutdown.changed() => break,
            }
            if *self.shutdown.borrow() {
                break;
            }

            if self.api.credentials_near_expiry().await {
                if let Err(e) = self.api.refresh_credentials().await {
                    tracing::warn!(
                        "Proactive token refresh failed ({}), deferring to call-time refresh: {}",
                        e.kind,
                        e.message
                    );
                }
            }
        }
        tracing::info!("Renewal task stopped");
    }
}
