//! Retry and fallback around completion providers.
//!
//! Each attempt is bounded by a timeout. Retryable failures back off
//! exponentially and try again; once a provider's retries are spent the next
//! provider in the chain is tried.

use super::{ChatRequest, ChatResponse, Provider, ProviderError};
use async_trait::async_trait;
use finbot_common::config::LlmConfig;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for resilient provider behavior.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Maximum number of retries per provider before falling back.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds (doubles with each retry).
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Upper bound on a single provider call.
    pub attempt_timeout: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff_ms: 200,
            max_backoff_ms: 5_000,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&LlmConfig> for ResilienceConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.retries,
            base_backoff_ms: config.base_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            attempt_timeout: config.timeout(),
        }
    }
}

/// Wraps one or more providers with retry and fallback behavior.
pub struct ResilientProvider {
    providers: Vec<Arc<dyn Provider>>,
    config: ResilienceConfig,
}

impl ResilientProvider {
    /// The first provider is the primary, subsequent providers are fallbacks.
    pub fn new(providers: Vec<Arc<dyn Provider>>, config: ResilienceConfig) -> Self {
        Self { providers, config }
    }

    /// Create from a single provider with retry support (no fallbacks).
    pub fn single(provider: Arc<dyn Provider>, config: ResilienceConfig) -> Self {
        Self::new(vec![provider], config)
    }

    /// Calculate backoff delay for a given attempt.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .config
            .base_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.config.max_backoff_ms);
        Duration::from_millis(delay_ms)
    }

    async fn attempt(
        &self,
        provider: &dyn Provider,
        request: ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let model = request.model.clone();
        let limit = self.config.attempt_timeout;
        match tokio::time::timeout(limit, provider.chat(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timed_out(provider.name(), model, limit)),
        }
    }
}

#[async_trait]
impl Provider for ResilientProvider {
    fn name(&self) -> &str {
        "resilient"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut all_errors = Vec::new();
        let mut last_status = None;
        let mut last_timeout = None;

        for (provider_idx, provider) in self.providers.iter().enumerate() {
            let provider_name = provider.name();

            for attempt in 0..=self.config.max_retries {
                match self.attempt(provider.as_ref(), request.clone()).await {
                    Ok(response) => {
                        if attempt > 0 || provider_idx > 0 {
                            tracing::info!(
                                provider = provider_name,
                                attempt = attempt + 1,
                                "Provider recovered after retries"
                            );
                        }
                        return Ok(response);
                    }
                    Err(e) => {
                        all_errors.push(format!(
                            "{} attempt {}/{}: {}",
                            provider_name,
                            attempt + 1,
                            self.config.max_retries + 1,
                            e.message
                        ));
                        last_status = e.status_code;
                        last_timeout = e.timeout;

                        if !e.is_retryable() {
                            tracing::warn!(
                                provider = provider_name,
                                status = ?e.status_code,
                                "Provider call failed with non-retryable error"
                            );
                            break;
                        }

                        if attempt < self.config.max_retries {
                            let delay = self.backoff_delay(attempt);
                            tracing::warn!(
                                provider = provider_name,
                                attempt = attempt + 1,
                                max_retries = self.config.max_retries,
                                delay_ms = delay.as_millis() as u64,
                                "Provider call failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }

            if let Some(next) = self.providers.get(provider_idx + 1) {
                tracing::warn!(
                    failed_provider = provider_name,
                    next_provider = next.name(),
                    "Switching to fallback provider"
                );
            }
        }

        if all_errors.is_empty() {
            all_errors.push("no providers configured".to_string());
        }

        Err(ProviderError {
            timeout: last_timeout,
            ..ProviderError::new(
                "resilient",
                request.model,
                format!("All providers failed. Attempts:\n{}", all_errors.join("\n")),
                last_status,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails `fail_until` times with `status`, then succeeds.
    struct MockProvider {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        fail_until: usize,
        status: Option<u16>,
        delay: Duration,
    }

    impl MockProvider {
        fn new(
            name: &'static str,
            fail_until: usize,
            status: Option<u16>,
        ) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    name,
                    calls: Arc::clone(&calls),
                    fail_until,
                    status,
                    delay: Duration::ZERO,
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            if attempt <= self.fail_until {
                return Err(ProviderError::new(
                    self.name,
                    request.model,
                    format!("{} error", self.name),
                    self.status,
                ));
            }

            Ok(ChatResponse {
                provider: self.name.to_string(),
                model: request.model,
                content: format!("from {}", self.name),
                usage: Default::default(),
                finish_reason: Some("stop".to_string()),
                latency_ms: 1,
            })
        }
    }

    fn fast_config(max_retries: u32) -> ResilienceConfig {
        ResilienceConfig {
            max_retries,
            base_backoff_ms: 1,
            max_backoff_ms: 10,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn make_request() -> ChatRequest {
        ChatRequest::single("test-model", "hello")
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let (provider, calls) = MockProvider::new("primary", 0, Some(500));
        let resilient = ResilientProvider::single(Arc::new(provider), fast_config(2));

        let result = resilient.chat(make_request()).await.unwrap();
        assert_eq!(result.content, "from primary");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let (provider, calls) = MockProvider::new("primary", 1, Some(503));
        let resilient = ResilientProvider::single(Arc::new(provider), fast_config(2));

        let result = resilient.chat(make_request()).await.unwrap();
        assert_eq!(result.content, "from primary");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_is_not_retried() {
        let (provider, calls) = MockProvider::new("primary", usize::MAX, Some(400));
        let resilient = ResilientProvider::single(Arc::new(provider), fast_config(3));

        let err = resilient.chat(make_request()).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.status_code, Some(400));
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (provider, calls) = MockProvider::new("primary", usize::MAX, Some(429));
        let resilient = ResilientProvider::single(Arc::new(provider), fast_config(2));

        let err = resilient.chat(make_request()).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.message.contains("primary attempt 3/3"));
    }

    #[tokio::test]
    async fn falls_back_after_retries_exhausted() {
        let (primary, primary_calls) = MockProvider::new("primary", usize::MAX, None);
        let (fallback, fallback_calls) = MockProvider::new("fallback", 0, None);

        let resilient = ResilientProvider::new(
            vec![Arc::new(primary), Arc::new(fallback)],
            fast_config(1),
        );

        let result = resilient.chat(make_request()).await.unwrap();
        assert_eq!(result.content, "from fallback");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 2);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn returns_aggregated_error_when_all_fail() {
        let (p1, _) = MockProvider::new("provider1", usize::MAX, Some(500));
        let (p2, _) = MockProvider::new("provider2", usize::MAX, Some(500));

        let resilient =
            ResilientProvider::new(vec![Arc::new(p1), Arc::new(p2)], fast_config(0));

        let err = resilient.chat(make_request()).await.unwrap_err();
        assert!(err.message.contains("All providers failed"));
        assert!(err.message.contains("provider1 attempt 1/1"));
        assert!(err.message.contains("provider2 attempt 1/1"));
    }

    #[tokio::test]
    async fn slow_attempts_time_out_and_retry() {
        let (mut provider, calls) = MockProvider::new("slow", 0, None);
        provider.delay = Duration::from_millis(200);
        let resilient = ResilientProvider::single(
            Arc::new(provider),
            ResilienceConfig {
                attempt_timeout: Duration::from_millis(20),
                ..fast_config(1)
            },
        );

        let err = resilient.chat(make_request()).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(err.message.contains("Timed out"));
        assert_eq!(err.timeout, Some(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn http_failure_after_timeout_clears_timeout() {
        let (mut slow, _) = MockProvider::new("slow", 0, None);
        slow.delay = Duration::from_millis(200);
        let (failing, _) = MockProvider::new("failing", usize::MAX, Some(503));
        let resilient = ResilientProvider::new(
            vec![Arc::new(slow), Arc::new(failing)],
            ResilienceConfig {
                attempt_timeout: Duration::from_millis(20),
                ..fast_config(0)
            },
        );

        let err = resilient.chat(make_request()).await.unwrap_err();
        assert_eq!(err.status_code, Some(503));
        assert!(err.timeout.is_none());
    }

    #[tokio::test]
    async fn empty_chain_fails() {
        let resilient = ResilientProvider::new(vec![], fast_config(1));
        let err = resilient.chat(make_request()).await.unwrap_err();
        assert!(err.message.contains("no providers configured"));
    }

    #[test]
    fn backoff_doubles_with_attempts() {
        let resilient = ResilientProvider::new(vec![], ResilienceConfig::default());

        assert_eq!(resilient.backoff_delay(0).as_millis(), 200);
        assert_eq!(resilient.backoff_delay(1).as_millis(), 400);
        assert_eq!(resilient.backoff_delay(2).as_millis(), 800);
    }

    #[test]
    fn backoff_caps_at_max() {
        let resilient = ResilientProvider::new(
            vec![],
            ResilienceConfig {
                max_retries: 10,
                base_backoff_ms: 100,
                max_backoff_ms: 500,
                attempt_timeout: Duration::from_secs(1),
            },
        );
        assert_eq!(resilient.backoff_delay(20).as_millis(), 500);
    }

    #[test]
    fn config_from_llm_section() {
        let llm = LlmConfig {
            retries: 4,
            timeout_secs: 7,
            ..LlmConfig::default()
        };
        let config = ResilienceConfig::from(&llm);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.attempt_timeout, Duration::from_secs(7));
    }
}
