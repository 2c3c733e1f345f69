//! Authenticated HTTP transport for the game server, with automatic
//! retry for transient errors.
//!
//! Credential freshness is enforced before every authenticated call; a
//! 401 despite a locally-fresh token triggers exactly one
//! refresh-and-retry of the original call. Rate limits, server errors,
//! and network failures are retried with capped exponential backoff
//! inside a wall-clock budget; game-rule rejections are surfaced
//! immediately.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;

use crate::config::{Config, RetrySettings};
use crate::market::{CropInfo, MarketSnapshot};
use crate::secrets::ClientCredentials;
use crate::state::SharedFarmState;

use super::credentials::{Credential, CredentialCache, TokenExchanger};
use super::error::{classify_http_status, ApiError, ApiErrorKind};
use super::types::{
    CollectResponse, CropsResponse, ErrorBody, HarvestRequest, HarvestResponse,
    LandActionResponse, LandResponse, LeaderboardResponse, PlantRequest, PlantResponse,
    ProfileResponse, RegisterResponse, TokenResponse,
};

/// Client for the HappyHarvest API.
///
/// Holds no farm-domain state beyond the credential; successful typed
/// responses are applied to the shared farm state in the calling
/// task's context (write-after-confirm).
pub struct ApiClient {
    http: Client,
    base_url: String,
    credentials: CredentialCache,
    exchanger: HttpTokenExchanger,
    retry: RetrySettings,
    state: SharedFarmState,
}

impl ApiClient {
    pub fn new(
        config: &Config,
        creds: &ClientCredentials,
        state: SharedFarmState,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("harvestbot/0.1")
            .build()?;
        let exchanger = HttpTokenExchanger {
            http: http.clone(),
            token_url: format!("{}/auth/token", config.base_url),
            client_id: creds.client_id.clone(),
            client_secret: creds.client_secret.clone(),
        };
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            credentials: CredentialCache::new(config.renewal_safety_margin()),
            exchanger,
            retry: config.retry.clone(),
            state,
        })
    }

    /// Obtain the initial token. Failing here is a startup error.
    pub async fn authenticate(&self) -> Result<(), ApiError> {
        self.credentials.refresh(&self.exchanger).await.map(|_| ())
    }

    /// Force a token refresh, deduplicated with any in-flight refresh.
    pub async fn refresh_credentials(&self) -> Result<(), ApiError> {
        self.credentials.refresh(&self.exchanger).await.map(|_| ())
    }

    /// Whether the cached token is within the renewal safety margin.
    pub async fn credentials_near_expiry(&self) -> bool {
        self.credentials.near_expiry().await
    }

    /// Register a new farmer. One-time call, never retried
    /// automatically: a duplicate registration cannot be undone.
    pub async fn register(&self, playername: &str) -> Result<RegisterResponse, ApiError> {
        let body = serde_json::json!({ "playername": playername });
        self.execute_once(&Method::POST, "/register", Some(&body), false)
            .await
    }

    pub async fn collect_water(&self) -> Result<CollectResponse, ApiError> {
        let response: CollectResponse = self.request(Method::POST, "/collect", None, true).await?;
        self.state.apply_water(response.score).await;
        Ok(response)
    }

    pub async fn profile(&self) -> Result<ProfileResponse, ApiError> {
        let response: ProfileResponse = self.request(Method::GET, "/profile", None, true).await?;
        self.state.apply_profile(&response).await;
        Ok(response)
    }

    pub async fn land(&self) -> Result<LandResponse, ApiError> {
        let response: LandResponse = self.request(Method::GET, "/land", None, true).await?;
        self.state.apply_land(&response).await;
        Ok(response)
    }

    /// Fetch live crop pricing. Unauthenticated; prices are fully
    /// replaced by the server on every query.
    pub async fn crops(&self) -> Result<MarketSnapshot, ApiError> {
        let response: CropsResponse = self.request(Method::GET, "/crops", None, false).await?;
        Ok(MarketSnapshot::from_response(&response, Utc::now()))
    }

    pub async fn leaderboard(&self) -> Result<LeaderboardResponse, ApiError> {
        self.request(Method::GET, "/leaderboard", None, false).await
    }

    pub async fn plant(&self, crop: &CropInfo, plot: usize) -> Result<PlantResponse, ApiError> {
        let (row, col) = self.plot_coords(plot).await?;
        let body = serde_json::to_value(PlantRequest {
            crop_type: crop.crop_type.clone(),
            row,
            col,
        })
        .map_err(|e| ApiError::parse(format!("plant request encoding failed: {e}")))?;

        let response: PlantResponse =
            self.request(Method::POST, "/plant", Some(body), true).await?;

        let planted_at = Utc::now();
        let matures_at = planted_at + chrono::Duration::minutes(i64::from(crop.grow_time_minutes));
        if !self
            .state
            .apply_plant(plot, &crop.crop_type, planted_at, matures_at)
            .await
        {
            tracing::debug!("plant confirmation for plot {plot} was already applied");
        }
        if let Some(score) = response.score {
            self.state.apply_water(score).await;
        }
        Ok(response)
    }

    pub async fn harvest(&self, plot: usize) -> Result<HarvestResponse, ApiError> {
        let (row, col) = self.plot_coords(plot).await?;
        let body = serde_json::to_value(HarvestRequest { row, col })
            .map_err(|e| ApiError::parse(format!("harvest request encoding failed: {e}")))?;

        let response: HarvestResponse =
            self.request(Method::POST, "/harvest", Some(body), true).await?;

        if !self.state.apply_harvest(plot, response.credits_earned).await {
            tracing::debug!("harvest confirmation for plot {plot} was already applied");
        }
        if let Some(score) = response.score {
            self.state.apply_water(score).await;
        }
        Ok(response)
    }

    pub async fn claim_land(&self) -> Result<LandActionResponse, ApiError> {
        let response = self.request(Method::POST, "/claimLand", None, true).await?;
        self.refresh_land_view().await;
        Ok(response)
    }

    pub async fn expand_land(&self) -> Result<LandActionResponse, ApiError> {
        let response = self.request(Method::POST, "/expandLand", None, true).await?;
        self.refresh_land_view().await;
        Ok(response)
    }

    /// Re-fetch `/land` so the confirmed grid replaces the local view
    /// after a claim or expansion.
    async fn refresh_land_view(&self) {
        if let Err(e) = self.land().await {
            tracing::warn!("land refresh after expansion failed ({}): {}", e.kind, e.message);
        }
    }

    async fn plot_coords(&self, plot: usize) -> Result<(u32, u32), ApiError> {
        let (width, _) = self.state.land_size().await;
        if width == 0 {
            return Err(ApiError::rejected(400, "no land claimed"));
        }
        let plot = plot as u32;
        Ok((plot / width, plot % width))
    }

    /// Issue one call with auth enforcement, transient retry, and
    /// single-shot reauthentication on 401.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        auth: bool,
    ) -> Result<T, ApiError> {
        let reauthed = AtomicBool::new(false);
        let method_ref = &method;
        let body_ref = body.as_ref();
        let reauthed_ref = &reauthed;

        execute_with_retry(&self.retry, path, move || async move {
            match self.execute_once::<T>(method_ref, path, body_ref, auth).await {
                Err(e)
                    if e.kind == ApiErrorKind::Auth
                        && auth
                        && !reauthed_ref.swap(true, Ordering::SeqCst) =>
                {
                    // 401 despite a locally-fresh token: the server
                    // revoked it. Invalidate, refresh once, retry once.
                    tracing::warn!("{path} answered 401, forcing a token refresh");
                    self.credentials.invalidate().await;
                    self.credentials.refresh(&self.exchanger).await?;
                    self.execute_once::<T>(method_ref, path, body_ref, auth).await
                }
                other => other,
            }
        })
        .await
    }

    async fn execute_once<T: DeserializeOwned>(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        auth: bool,
    ) -> Result<T, ApiError> {
        let mut request = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, path));
        if auth {
            let token = self.credentials.fresh_token(&self.exchanger).await?;
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(classify_response(status, &text, retry_after));
        }

        serde_json::from_str(&text)
            .map_err(|e| ApiError::parse(format!("{path} response did not match contract: {e}")))
    }
}

/// Token exchange against `/auth/token`.
struct HttpTokenExchanger {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(&self) -> Result<Credential, ApiError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(ApiError::auth("client credentials not set"));
        }
        let body = serde_json::json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "grant_type": "client_credentials",
        });

        let response = self
            .http
            .post(&self.token_url)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(classify_response(status, &text, retry_after));
        }

        let token: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::parse(format!("token response did not match contract: {e}")))?;
        Ok(Credential {
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in as i64),
        })
    }
}

/// Run `op` until it succeeds, fails non-transiently, or exhausts the
/// retry policy. Transient failures back off exponentially with jitter;
/// the whole sequence is bounded by the configured wall-clock budget.
pub(crate) async fn execute_with_retry<T, F, Fut>(
    retry: &RetrySettings,
    label: &str,
    mut op: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        let error = match op().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(
                        "{label} succeeded after {} retries ({:?} elapsed)",
                        attempt,
                        start.elapsed()
                    );
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let budget_left = retry.retry_budget().saturating_sub(start.elapsed());
        let should_retry =
            error.is_transient() && attempt < retry.max_retries && !budget_left.is_zero();
        if !should_retry {
            if error.is_transient() {
                tracing::error!(
                    "{label} failed after {} attempts ({:?} elapsed): {}",
                    attempt + 1,
                    start.elapsed(),
                    error
                );
            }
            return Err(error);
        }

        let delay = error.suggested_delay(attempt, retry).min(budget_left);
        tracing::warn!(
            "{label} attempt {} failed with {}, retrying in {:?}: {}",
            attempt + 1,
            error.kind,
            delay,
            error.message
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

fn map_transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::network(format!("request timeout: {e}"))
    } else if e.is_connect() {
        ApiError::network(format!("connection failed: {e}"))
    } else {
        ApiError::network(format!("request failed: {e}"))
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok().map(Duration::from_secs))
}

fn classify_response(status: StatusCode, body: &str, retry_after: Option<Duration>) -> ApiError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message().map(str::to_string))
        .unwrap_or_else(|| {
            let mut text: String = body.chars().take(200).collect();
            if text.is_empty() {
                text = format!("HTTP {status}");
            }
            text
        });

    let code = status.as_u16();
    match classify_http_status(code) {
        ApiErrorKind::Auth => ApiError::auth(detail),
        ApiErrorKind::RateLimited => ApiError::rate_limited(detail, retry_after),
        ApiErrorKind::Server => ApiError::server(code, detail),
        _ => ApiError::rejected(code, detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn retry_settings() -> RetrySettings {
        RetrySettings {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            retry_budget_ms: 30_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn three_transient_failures_then_success() {
        let retry = retry_settings();
        let calls = AtomicUsize::new(0);
        let started = Instant::now();

        let calls_ref = &calls;
        let result: Result<u32, ApiError> = execute_with_retry(&retry, "/collect", move || {
            async move {
                let n = calls_ref.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 3 {
                    Err(ApiError::server(503, "unavailable"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        // the 200's payload is delivered exactly once, within the budget
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() <= retry.retry_budget());
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let retry = retry_settings();
        let calls = AtomicUsize::new(0);

        let calls_ref = &calls;
        let result: Result<u32, ApiError> = execute_with_retry(&retry, "/harvest", move || {
            async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::rejected(409, "plot not mature"))
            }
        })
        .await;

        let error = result.unwrap_err();
        assert_eq!(error.kind, ApiErrorKind::Rejected);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_surfaces_a_transient_error() {
        let retry = retry_settings();
        let calls = AtomicUsize::new(0);

        let calls_ref = &calls;
        let result: Result<u32, ApiError> = execute_with_retry(&retry, "/collect", move || {
            async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::server(502, "bad gateway"))
            }
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        // first attempt plus the configured number of retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_caps_total_delay() {
        let retry = RetrySettings {
            max_retries: 10,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            retry_budget_ms: 250,
        };
        let started = Instant::now();

        let result: Result<u32, ApiError> = execute_with_retry(&retry, "/collect", || async {
            Err(ApiError::network("connection reset"))
        })
        .await;

        assert!(result.is_err());
        assert!(started.elapsed() <= retry.retry_budget());
    }

    #[test]
    fn classification_includes_server_detail() {
        let error = classify_response(
            StatusCode::CONFLICT,
            r#"{"error": "not_mature", "error_description": "plot not yet mature"}"#,
            None,
        );
        assert_eq!(error.kind, ApiErrorKind::Rejected);
        assert_eq!(error.message, "plot not yet mature");

        let error = classify_response(StatusCode::SERVICE_UNAVAILABLE, "", None);
        assert_eq!(error.kind, ApiErrorKind::Server);
    }
}
