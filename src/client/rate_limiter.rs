//! Adaptive rate limiter shared by all workers of a batch.
//!
//! Epistemic foundation:
//! - K_i: OpenAI-compatible servers may return rate limit headers
//! - K_i: 429 errors require exponential backoff
//! - I^B: Exact rate limits unknowable until headers received

use dashmap::DashMap;
use reqwest::header::HeaderMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Backoff ceiling after repeated 429s.
const MAX_BACKOFF_SECS: f64 = 60.0;

/// Rate limit state for a single model.
#[derive(Debug, Default)]
pub struct ModelRateLimitState {
    /// Remaining requests in current interval
    pub remaining_requests: Option<u32>,
    /// When the request limit resets
    pub reset_requests_at: Option<Instant>,
    /// Consecutive 429 errors (for backoff)
    pub consecutive_429s: u32,
    /// Backoff until this time
    pub backoff_until: Option<Instant>,
}

impl ModelRateLimitState {
    /// Get time to wait before proceeding.
    pub fn wait_time(&self) -> Duration {
        let now = Instant::now();
        let mut max_wait = Duration::ZERO;

        if let Some(until) = self.backoff_until.filter(|&t| t > now) {
            max_wait = max_wait.max(until - now);
        }

        if self.remaining_requests == Some(0) {
            if let Some(reset_at) = self.reset_requests_at.filter(|&t| t > now) {
                max_wait = max_wait.max(reset_at - now);
            }
        }

        max_wait
    }

    /// Record a 429 error; honors the server hint when it is longer.
    pub fn record_429(&mut self, retry_after: Option<Duration>) {
        self.consecutive_429s += 1;
        let exponential = 2.0_f64.powi(self.consecutive_429s as i32).min(MAX_BACKOFF_SECS);
        let backoff = retry_after
            .map(|d| d.as_secs_f64().max(exponential))
            .unwrap_or(exponential);
        self.backoff_until = Some(Instant::now() + Duration::from_secs_f64(backoff));
        warn!(
            consecutive_429s = self.consecutive_429s,
            backoff_secs = backoff,
            "Rate limited (429), backing off"
        );
    }

    /// Record a successful request.
    pub fn record_success(&mut self) {
        self.consecutive_429s = 0;
        self.backoff_until = None;
    }

    /// Update state from `x-ratelimit-*` response headers.
    pub fn update_from_headers(&mut self, headers: &HeaderMap) {
        let header = |key: &str| headers.get(key)?.to_str().ok().map(str::to_string);

        if let Some(remaining) = header("x-ratelimit-remaining-requests") {
            self.remaining_requests = remaining.parse().ok();
        }
        if let Some(secs) =
            header("x-ratelimit-reset-requests").and_then(|s| s.trim_end_matches('s').parse::<f64>().ok())
        {
            self.reset_requests_at = Some(Instant::now() + Duration::from_secs_f64(secs));
        }
    }
}

/// Per-model rate limiter.
///
/// One instance per client; the client is shared across workers, so a 429
/// seen by one worker slows down all of them.
#[derive(Debug, Default)]
pub struct RateLimiter {
    states: DashMap<String, ModelRateLimitState>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait if necessary before making a request to the given model.
    ///
    /// Returns the duration waited.
    pub async fn wait_if_needed(&self, model: &str) -> Duration {
        // Guard must drop before sleeping.
        let wait_time = self
            .states
            .entry(model.to_string())
            .or_default()
            .wait_time();

        if wait_time > Duration::ZERO {
            debug!(
                model = model,
                wait_ms = wait_time.as_millis() as u64,
                "Waiting for rate limit"
            );
            tokio::time::sleep(wait_time).await;
        }

        wait_time
    }

    /// Record a response status and headers.
    pub fn record_response(&self, model: &str, status: u16, headers: &HeaderMap) {
        let mut state = self.states.entry(model.to_string()).or_default();
        state.update_from_headers(headers);

        if status == 429 {
            state.record_429(retry_after(headers));
        } else if status < 400 {
            state.record_success();
        }
    }

    /// Current wait for a model, without sleeping.
    pub fn pending_wait(&self, model: &str) -> Duration {
        self.states
            .get(model)
            .map(|state| state.wait_time())
            .unwrap_or(Duration::ZERO)
    }
}

/// Parse the `retry-after` header (seconds).
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_429_sets_backoff_and_success_clears_it() {
        let limiter = RateLimiter::new();
        limiter.record_response("m", 429, &HeaderMap::new());
        assert!(limiter.pending_wait("m") > Duration::ZERO);

        limiter.record_response("m", 200, &HeaderMap::new());
        assert_eq!(limiter.pending_wait("m"), Duration::ZERO);
    }

    #[test]
    fn test_retry_after_hint_is_honored() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("30"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(30)));

        let limiter = RateLimiter::new();
        limiter.record_response("m", 429, &headers);
        assert!(limiter.pending_wait("m") > Duration::from_secs(20));
    }

    #[test]
    fn test_exhausted_quota_waits_for_reset() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining-requests", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset-requests", HeaderValue::from_static("5s"));

        let limiter = RateLimiter::new();
        limiter.record_response("m", 200, &headers);
        assert!(limiter.pending_wait("m") > Duration::from_secs(3));
        assert_eq!(limiter.pending_wait("other"), Duration::ZERO);
    }
}
