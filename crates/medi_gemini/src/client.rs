//! Thin `generateContent` client with retry on transient failures.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{GeminiError, GeminiResult};
use crate::wire::{GenerateRequest, GenerateResponse};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Environment variables checked for an API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

const MAX_RETRIES: u32 = 3;

/// Upper bound for a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    max_retries: u32,
    backoff_base: Duration,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: MAX_RETRIES,
            backoff_base: Duration::from_secs(1),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client from environment variables
    ///
    /// Checks in order:
    /// 1. GEMINI_API_KEY
    /// 2. API_KEY
    pub fn from_env() -> GeminiResult<Self> {
        for var in API_KEY_VARS {
            if let Ok(api_key) = std::env::var(var) {
                if !api_key.is_empty() {
                    debug!("Using Gemini API key from {}", var);
                    return Ok(Self::new(api_key));
                }
            }
        }
        Err(GeminiError::NotConfigured)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Attempts per call and the first backoff delay; later delays double
    /// up to `MAX_BACKOFF`.
    pub fn with_retry_policy(mut self, max_retries: u32, backoff_base: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.backoff_base = backoff_base;
        self
    }

    /// Sleep before `attempt`: the base delay doubled per earlier retry,
    /// saturating at `MAX_BACKOFF`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        1u32.checked_shl(attempt - 1)
            .and_then(|factor| self.backoff_base.checked_mul(factor))
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a `generateContent` request for `model`.
    ///
    /// Network errors, 429 and 5xx are retried with exponential backoff.
    /// Any other non-success status fails immediately.
    pub async fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> GeminiResult<GenerateResponse> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }

            let response = match self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(
                        "Gemini network error (attempt {}/{}): {}",
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    last_error = format!("network error: {}", e);
                    continue;
                }
            };

            let status = response.status();

            if status.is_server_error() || status.as_u16() == 429 {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    "Gemini API error {} (attempt {}/{}): {}",
                    status,
                    attempt + 1,
                    self.max_retries,
                    body
                );
                last_error = format!("status {}: {}", status.as_u16(), body);
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GeminiError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let body = response.text().await?;
            let parsed: GenerateResponse = serde_json::from_str(&body)?;
            debug!(
                "Gemini {} answered with {} candidate(s)",
                model,
                parsed.candidates.len()
            );
            return Ok(parsed);
        }

        Err(GeminiError::RetriesExhausted(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = GeminiClient::new("key").with_base_url("http://127.0.0.1:9999/");
        assert_eq!(client.base_url(), "http://127.0.0.1:9999");
    }

    #[test]
    fn test_retry_policy_keeps_one_attempt() {
        let client = GeminiClient::new("key").with_retry_policy(0, Duration::from_millis(1));
        assert_eq!(client.max_retries, 1);
    }

    #[test]
    fn test_backoff_doubles_then_saturates() {
        let client = GeminiClient::new("key").with_retry_policy(3, Duration::from_secs(1));
        assert_eq!(client.backoff_delay(0), Duration::ZERO);
        assert_eq!(client.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(client.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(client.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(client.backoff_delay(7), MAX_BACKOFF);
        assert_eq!(client.backoff_delay(40), MAX_BACKOFF);
        assert_eq!(client.backoff_delay(u32::MAX), MAX_BACKOFF);

        let huge = GeminiClient::new("key").with_retry_policy(3, Duration::MAX);
        assert_eq!(huge.backoff_delay(2), MAX_BACKOFF);

        let zero = GeminiClient::new("key").with_retry_policy(40, Duration::ZERO);
        assert_eq!(zero.backoff_delay(39), Duration::ZERO);
    }

    #[test]
    fn test_from_env_prefers_gemini_key() {
        std::env::set_var("GEMINI_API_KEY", "gemini-key");
        std::env::set_var("API_KEY", "generic-key");
        let client = GeminiClient::from_env().unwrap();
        assert_eq!(client.api_key, "gemini-key");

        std::env::set_var("GEMINI_API_KEY", "");
        let client = GeminiClient::from_env().unwrap();
        assert_eq!(client.api_key, "generic-key");

        std::env::remove_var("GEMINI_API_KEY");
        std::env::remove_var("API_KEY");
        assert!(matches!(
            GeminiClient::from_env(),
            Err(GeminiError::NotConfigured)
        ));
    }
}
