//! Completion provider abstraction.
//!
//! The chat flow talks to a [`Provider`]; production wires a
//! [`GeminiProvider`] behind a [`ResilientProvider`], tests substitute
//! scripted fakes.

mod gemini;
mod resilient;

pub use gemini::{GeminiProvider, DEFAULT_BASE_URL};
pub use resilient::{ResilienceConfig, ResilientProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Provider Trait
// ============================================================================

/// Unified interface for text-completion backends.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Send a completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{provider}:{model}] {message}")]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
    /// Set when the call was abandoned after this long.
    pub timeout: Option<Duration>,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            message: message.into(),
            status_code,
            timeout: None,
        }
    }

    /// An attempt abandoned after `after`.
    pub fn timed_out(
        provider: impl Into<String>,
        model: impl Into<String>,
        after: Duration,
    ) -> Self {
        Self {
            timeout: Some(after),
            ..Self::new(
                provider,
                model,
                format!("Timed out after {}ms", after.as_millis()),
                None,
            )
        }
    }

    /// Transport failures, timeouts, rate limiting and server errors are
    /// worth another attempt; other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self.status_code {
            None => true,
            Some(429) => true,
            Some(code) => (500..600).contains(&code),
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Unified chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model to use
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<Message>,
}

impl ChatRequest {
    /// A request carrying one user message.
    pub fn single(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::user(prompt)],
        }
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Unified chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Provider name
    pub provider: String,
    /// Model used
    pub model: String,
    /// Generated text
    pub content: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
    /// Response latency in milliseconds
    pub latency_ms: u64,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        let err = |code| ProviderError::new("gemini", "m", "x", code);
        assert!(err(None).is_retryable());
        assert!(err(Some(429)).is_retryable());
        assert!(err(Some(500)).is_retryable());
        assert!(err(Some(503)).is_retryable());
        assert!(!err(Some(400)).is_retryable());
        assert!(!err(Some(401)).is_retryable());
        assert!(!err(Some(404)).is_retryable());
    }

    #[test]
    fn error_display_names_provider_and_model() {
        let err = ProviderError::new("gemini", "gemini-2.0-flash", "boom", Some(500));
        assert_eq!(err.to_string(), "[gemini:gemini-2.0-flash] boom");
    }

    #[test]
    fn single_request_serialization() {
        let request = ChatRequest::single("gemini-2.0-flash", "Hello");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gemini-2.0-flash");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    #[test]
    fn timed_out_error_is_retryable() {
        let err = ProviderError::timed_out("gemini", "m", Duration::from_millis(1500));
        assert_eq!(err.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(err.message, "Timed out after 1500ms");
        assert!(err.is_retryable());
        assert!(ProviderError::new("gemini", "m", "x", None).timeout.is_none());
    }
}
