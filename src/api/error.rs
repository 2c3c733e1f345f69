//! API error taxonomy and retry policy.
//!
//! Every failure from the game server is classified into a kind the
//! rest of the agent can act on: transient failures are retried with
//! backoff inside the client, rejections surface to the strategy loop
//! as "this action is currently invalid", auth failures force a
//! credential refresh.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::config::RetrySettings;

/// Classified failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Invalid or expired credentials; retrying without a refresh cannot help.
    Auth,
    /// HTTP 429; retry after backing off.
    RateLimited,
    /// HTTP 5xx; retry with backoff.
    Server,
    /// Timeout, connection reset, DNS failure; retry with backoff.
    Network,
    /// Game-rule violation (4xx other than 401/429); never retried.
    Rejected,
    /// Response body did not match the endpoint contract.
    Parse,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ApiErrorKind::Auth => "auth",
            ApiErrorKind::RateLimited => "rate-limited",
            ApiErrorKind::Server => "server",
            ApiErrorKind::Network => "network",
            ApiErrorKind::Rejected => "rejected",
            ApiErrorKind::Parse => "parse",
        };
        f.write_str(label)
    }
}

/// Error returned by the API client.
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    /// HTTP status, when the server answered at all.
    pub status: Option<u16>,
    /// Server-suggested delay from a `Retry-After` header.
    pub retry_after: Option<Duration>,
}

impl ApiError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Auth,
            message: message.into(),
            status: Some(401),
            retry_after: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            kind: ApiErrorKind::RateLimited,
            message: message.into(),
            status: Some(429),
            retry_after,
        }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Server,
            message: message.into(),
            status: Some(status),
            retry_after: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Network,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Rejected,
            message: message.into(),
            status: Some(status),
            retry_after: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Parse,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    /// Whether retrying with backoff can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ApiErrorKind::RateLimited | ApiErrorKind::Server | ApiErrorKind::Network
        )
    }

    /// Whether this failure means the action's preconditions no longer
    /// hold (the strategy loop falls back to waiting).
    pub fn is_rejection(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Rejected | ApiErrorKind::Parse)
    }

    /// Backoff delay before the given retry attempt (0-based).
    ///
    /// Exponential growth from the base delay with up to 25% jitter,
    /// capped at the configured maximum. A server-provided
    /// `Retry-After` wins over the computed delay.
    pub fn suggested_delay(&self, attempt: u32, retry: &RetrySettings) -> Duration {
        if let Some(after) = self.retry_after {
            return after.min(retry.max_delay());
        }
        let exp = retry
            .base_delay()
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(retry.max_delay());
        let jitter_cap = (exp.as_millis() / 4) as u64;
        let jitter = if jitter_cap > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_cap))
        } else {
            Duration::ZERO
        };
        (exp + jitter).min(retry.max_delay())
    }
}

/// Map an HTTP status to an error kind.
pub fn classify_http_status(status: u16) -> ApiErrorKind {
    match status {
        401 => ApiErrorKind::Auth,
        429 => ApiErrorKind::RateLimited,
        500..=599 => ApiErrorKind::Server,
        400..=499 => ApiErrorKind::Rejected,
        _ => ApiErrorKind::Server,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(classify_http_status(401), ApiErrorKind::Auth);
        assert_eq!(classify_http_status(429), ApiErrorKind::RateLimited);
        assert_eq!(classify_http_status(503), ApiErrorKind::Server);
        assert_eq!(classify_http_status(409), ApiErrorKind::Rejected);
        assert_eq!(classify_http_status(400), ApiErrorKind::Rejected);
    }

    #[test]
    fn transient_kinds() {
        assert!(ApiError::server(503, "unavailable").is_transient());
        assert!(ApiError::rate_limited("slow down", None).is_transient());
        assert!(ApiError::network("reset").is_transient());
        assert!(!ApiError::rejected(409, "plot not mature").is_transient());
        assert!(!ApiError::auth("expired").is_transient());
        assert!(!ApiError::parse("missing field").is_transient());
    }

    #[test]
    fn rejection_does_not_include_transients() {
        assert!(ApiError::rejected(409, "plot not mature").is_rejection());
        assert!(ApiError::parse("bad body").is_rejection());
        assert!(!ApiError::server(500, "oops").is_rejection());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let retry = RetrySettings {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            retry_budget_ms: 60_000,
        };
        let err = ApiError::server(503, "unavailable");
        for attempt in 0..6 {
            let delay = err.suggested_delay(attempt, &retry);
            // base * 2^attempt, jittered, never above the cap
            assert!(delay >= retry.base_delay().min(retry.max_delay()));
            assert!(delay <= retry.max_delay());
        }
        // early attempts stay near the base even with jitter
        let first = err.suggested_delay(0, &retry);
        assert!(first <= Duration::from_millis(125));
    }

    #[test]
    fn retry_after_wins_over_backoff() {
        let retry = RetrySettings::default();
        let err = ApiError::rate_limited("slow down", Some(Duration::from_secs(2)));
        assert_eq!(err.suggested_delay(0, &retry), Duration::from_secs(2));
        // but never beyond the configured cap
        let err = ApiError::rate_limited("slow down", Some(Duration::from_secs(600)));
        assert_eq!(err.suggested_delay(0, &retry), retry.max_delay());
    }
}
