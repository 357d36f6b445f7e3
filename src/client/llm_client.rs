//! LLM client for OpenAI-compatible endpoints (vLLM or hosted API).
//!
//! Epistemic foundation:
//! - K_i: OpenAI chat completions schema is the de facto standard
//! - B_i: API will respond within timeout (might fail)
//! - B_i: Response will be valid JSON (might fail)
//! - I^B: Network availability unknowable → retry with backoff

use crate::client::{retry_after, RateLimiter};
use crate::models::{
    ConfigError, EndpointSettings, Message, Provider, Result, SynthkitError, UpstreamError,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Timeout for the `/models` reachability check.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Sampling parameters for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: Option<f64>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
            top_p: None,
        }
    }
}

/// The LLM-call capability consumed by create and curate.
///
/// Implemented by `LlmClient`; stub implementations stand in for it in tests.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model ID requests are sent to.
    fn model(&self) -> &str;

    /// Single chat completion; returns the assistant text.
    async fn chat(&self, messages: Vec<Message>, options: &ChatOptions) -> Result<String>;

    /// Several independent completions issued concurrently, results in input order.
    async fn batch_chat(
        &self,
        batch: Vec<Vec<Message>>,
        options: &ChatOptions,
    ) -> Result<Vec<String>> {
        let requests = batch
            .into_iter()
            .map(|messages| self.chat(messages, options));
        futures::future::try_join_all(requests).await
    }
}

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// API error response (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for one OpenAI-compatible endpoint.
///
/// Features:
/// - Per-request timeout, so a hung call fails only its own item
/// - Retry with exponential backoff on network errors, 5xx and 429
/// - Shared per-model rate limiter
pub struct LlmClient {
    client: reqwest::Client,
    provider: Provider,
    api_key: Option<String>,
    api_base: String,
    model: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    rate_limiter: RateLimiter,
}

impl LlmClient {
    /// Create a client from resolved endpoint settings.
    ///
    /// B_i(api key available for hosted endpoints) → Result
    pub fn from_settings(settings: &EndpointSettings) -> Result<Self> {
        if settings.provider == Provider::ApiEndpoint && settings.api_key.is_none() {
            return Err(ConfigError::MissingApiKey {
                provider: settings.provider.to_string(),
                env_var: settings
                    .api_key_env
                    .clone()
                    .unwrap_or_else(|| "API_ENDPOINT_KEY".to_string()),
            }
            .into());
        }

        let timeout = Duration::from_secs(settings.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SynthkitError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            provider: settings.provider,
            api_key: settings.api_key.clone(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            timeout,
            max_retries: settings.max_retries.max(1),
            retry_delay: Duration::from_secs_f64(settings.retry_delay_secs.max(0.0)),
            rate_limiter: RateLimiter::new(),
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Build headers for a request.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(value) = self
            .api_key
            .as_ref()
            .and_then(|key| HeaderValue::from_str(&format!("Bearer {key}")).ok())
        {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        headers
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay * 2u32.saturating_pow(attempt)
    }

    /// Complete a chat request.
    ///
    /// B_i(API available) → Result
    /// B_i(valid response) → Result
    /// I^B(rate limits) → adaptive backoff
    pub async fn complete(&self, messages: Vec<Message>, options: &ChatOptions) -> Result<String> {
        let start = Instant::now();
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
        };

        let url = format!("{}/chat/completions", self.api_base);
        let mut last_error: Option<UpstreamError> = None;

        for attempt in 0..self.max_retries {
            self.rate_limiter.wait_if_needed(&self.model).await;

            let response = match self
                .client
                .post(&url)
                .headers(self.headers())
                .json(&request)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(self.transport_error(&e));
                    if attempt + 1 < self.max_retries {
                        let backoff = self.backoff(attempt);
                        debug!(
                            provider = %self.provider,
                            attempt = attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            "Retrying after network error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
            };

            let status = response.status().as_u16();
            let headers = response.headers().clone();
            self.rate_limiter
                .record_response(&self.model, status, &headers);

            if status == 429 {
                let wait = retry_after(&headers).unwrap_or(Duration::from_secs(1));
                last_error = Some(UpstreamError::RateLimited {
                    retry_after_secs: wait.as_secs_f64(),
                });
                // The rate limiter already holds the backoff; next attempt waits on it.
                continue;
            }

            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                let error = classify_status(status, &body, &self.model);
                let retryable = error.is_retryable();
                last_error = Some(error);

                if !retryable {
                    break;
                }
                if attempt + 1 < self.max_retries {
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                continue;
            }

            let body = response.text().await.map_err(|e| {
                UpstreamError::InvalidResponse(format!("Failed to read response body: {e}"))
            })?;
            let content = parse_completion(&body)?;

            debug!(
                model = %self.model,
                elapsed_ms = start.elapsed().as_millis() as u64,
                chars = content.len(),
                "Completion received"
            );
            return Ok(content);
        }

        // All retries exhausted
        let error = match last_error {
            Some(e) if self.max_retries == 1 => e,
            Some(e) => UpstreamError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: e.to_string(),
            },
            None => UpstreamError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: "Unknown error".to_string(),
            },
        };
        Err(error.into())
    }

    fn transport_error(&self, e: &reqwest::Error) -> UpstreamError {
        if e.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else {
            UpstreamError::Unreachable {
                endpoint: self.api_base.clone(),
                message: e.to_string(),
            }
        }
    }

    /// Health check: ping the /models endpoint.
    ///
    /// K_i: endpoint is reachable and responding
    /// B_i: endpoint is healthy if /models returns 200
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let url = format!("{}/models", self.api_base);

        match self
            .client
            .get(&url)
            .headers(self.headers())
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let status = response.status();
                if status.is_success() {
                    let models = response
                        .json::<serde_json::Value>()
                        .await
                        .ok()
                        .map(|body| model_ids(&body))
                        .unwrap_or_default();
                    HealthCheckResult {
                        endpoint: self.api_base.clone(),
                        status: HealthStatus::Healthy,
                        latency_ms: Some(latency_ms),
                        models,
                        error: None,
                    }
                } else {
                    HealthCheckResult {
                        endpoint: self.api_base.clone(),
                        status: HealthStatus::Unhealthy,
                        latency_ms: Some(latency_ms),
                        models: Vec::new(),
                        error: Some(format!("HTTP {}", status.as_u16())),
                    }
                }
            }
            Err(e) => HealthCheckResult {
                endpoint: self.api_base.clone(),
                status: HealthStatus::Unreachable,
                latency_ms: None,
                models: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: Vec<Message>, options: &ChatOptions) -> Result<String> {
        self.complete(messages, options).await
    }
}

/// Map a non-success status to an upstream error.
fn classify_status(status: u16, body: &str, model: &str) -> UpstreamError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        401 | 403 => UpstreamError::AuthenticationFailed,
        404 => UpstreamError::ModelNotFound(model.to_string()),
        _ => UpstreamError::Api { status, message },
    }
}

/// Extract the first choice's text from a completion body.
fn parse_completion(body: &str) -> std::result::Result<String, UpstreamError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| UpstreamError::InvalidResponse(format!("Failed to parse response: {e}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| UpstreamError::InvalidResponse("No choices in response".to_string()))
}

/// Model IDs from an OpenAI-style `/models` listing.
fn model_ids(body: &serde_json::Value) -> Vec<String> {
    body.get("data")
        .and_then(|d| d.as_array())
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Health check result.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// Endpoint base URL
    pub endpoint: String,
    pub status: HealthStatus,
    /// Latency in milliseconds (if reachable)
    pub latency_ms: Option<u64>,
    /// Models advertised by the endpoint
    pub models: Vec<String>,
    /// Error message (if unhealthy or unreachable)
    pub error: Option<String>,
}

/// Health status of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Endpoint is responding normally
    Healthy,
    /// Endpoint is responding but with errors
    Unhealthy,
    /// Endpoint is not reachable
    Unreachable,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;

    fn closed_port_settings(provider: Provider) -> EndpointSettings {
        EndpointSettings {
            provider,
            // Port 1 is reserved; connections are refused locally.
            api_base: "http://127.0.0.1:1/v1".to_string(),
            model: "test-model".to_string(),
            api_key: None,
            api_key_env: None,
            port: 1,
            timeout_secs: 5,
            max_retries: 1,
            retry_delay_secs: 0.0,
        }
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"This is a test response"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "This is a test response");

        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#).unwrap_err(),
            UpstreamError::InvalidResponse(_)
        ));
        assert!(matches!(
            parse_completion("not json").unwrap_err(),
            UpstreamError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_classify_status() {
        let body = r#"{"error":{"message":"overloaded","type":"server_error"}}"#;
        match classify_status(503, body, "m") {
            UpstreamError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            classify_status(401, "", "m"),
            UpstreamError::AuthenticationFailed
        ));
        assert!(matches!(
            classify_status(404, "", "m"),
            UpstreamError::ModelNotFound(_)
        ));
    }

    #[test]
    fn test_model_ids() {
        let body = serde_json::json!({"data": [{"id": "a"}, {"id": "b"}]});
        assert_eq!(model_ids(&body), vec!["a".to_string(), "b".to_string()]);
        assert!(model_ids(&serde_json::json!([])).is_empty());
    }

    #[test]
    fn test_api_endpoint_requires_key() {
        let settings = closed_port_settings(Provider::ApiEndpoint);
        let err = LlmClient::from_settings(&settings).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);

        assert!(LlmClient::from_settings(&closed_port_settings(Provider::Vllm)).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_upstream_error() {
        let client = LlmClient::from_settings(&closed_port_settings(Provider::Vllm)).unwrap();
        let err = client
            .chat(vec![Message::user("hi")], &ChatOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);

        let health = client.health_check().await;
        assert_eq!(health.status, HealthStatus::Unreachable);
        assert!(health.error.is_some());
    }
}
