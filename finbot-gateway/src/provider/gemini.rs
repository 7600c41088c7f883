//! Google Gemini provider.
//!
//! Calls the `generateContent` REST endpoint with an API key sent in the
//! `x-goog-api-key` header.

use super::{ChatRequest, ChatResponse, Provider, ProviderError, TokenUsage};
use async_trait::async_trait;
use finbot_common::config::LlmConfig;
use finbot_common::util::{sanitize_for_log, truncate_with_ellipsis};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Public Gemini API root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER_NAME: &str = "gemini";

/// Upstream error bodies are truncated to this many characters.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Gemini `generateContent` client.
pub struct GeminiProvider {
    api_key: Option<String>,
    base_url: String,
    temperature: f64,
    max_output_tokens: i64,
    client: Client,
}

// ══════════════════════════════════════════════════════════════════════════════
// API REQUEST/RESPONSE TYPES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<i64>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<i64>,
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<i64>,
}

impl GeminiProvider {
    /// Create a provider against the public endpoint with default sampling.
    pub fn new(api_key: Option<&str>) -> Self {
        Self::from_config(&LlmConfig {
            api_key: api_key.map(String::from),
            ..LlmConfig::default()
        })
    }

    /// Create a provider from the `llm` config section.
    pub fn from_config(config: &LlmConfig) -> Self {
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Self {
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            base_url,
            temperature: config.temperature,
            max_output_tokens: config.max_tokens,
            client: Client::builder()
                .timeout(config.timeout())
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Whether an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self, model: &str) -> String {
        let model_name = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/{model_name}:generateContent", self.base_url)
    }

    fn error(model: &str, message: impl AsRef<str>, status_code: Option<u16>) -> ProviderError {
        ProviderError::new(
            PROVIDER_NAME,
            model,
            sanitize_for_log(message.as_ref()),
            status_code,
        )
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();
        let model = request.model.as_str();

        let api_key = self.api_key.as_deref().ok_or_else(|| {
            Self::error(
                model,
                "Gemini API key not configured. Set GEMINI_API_KEY or llm.api_key.",
                Some(401),
            )
        })?;

        let contents: Vec<Content> = request
            .messages
            .iter()
            .map(|msg| Content {
                role: msg.role.clone(),
                parts: vec![Part {
                    text: msg.content.clone(),
                }],
            })
            .collect();

        let body = GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::error(model, format!("Request failed: {e}"), None))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::error(
                model,
                format!(
                    "API error ({}): {}",
                    status.as_u16(),
                    truncate_with_ellipsis(&error_text, MAX_ERROR_BODY_CHARS)
                ),
                Some(status.as_u16()),
            ));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Self::error(model, format!("Failed to parse response: {e}"), None))?;

        if let Some(err) = result.error {
            return Err(Self::error(model, format!("API error: {}", err.message), None));
        }

        let candidate = result
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| Self::error(model, "No candidates in response", None))?;

        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(Self::error(
                model,
                format!(
                    "Empty completion (finish reason: {})",
                    candidate.finish_reason.as_deref().unwrap_or("unknown")
                ),
                None,
            ));
        }

        let usage = result
            .usage_metadata
            .map_or(TokenUsage::default(), |u| TokenUsage {
                input_tokens: u.prompt_token_count.unwrap_or(0),
                output_tokens: u.candidates_token_count.unwrap_or(0),
                total_tokens: u.total_token_count.unwrap_or(0),
            });

        Ok(ChatResponse {
            provider: PROVIDER_NAME.into(),
            model: request.model.clone(),
            content,
            usage,
            finish_reason: candidate.finish_reason,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
