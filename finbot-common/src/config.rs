//! Configuration management for FinBot services.
//!
//! Configuration lives in a single JSON file at `~/.finbot/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (FINBOT_* prefix, provider keys)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `FINBOT_PORT` → network.port
//! - `FINBOT_BIND_ADDRESS` → network.bind
//! - `FINBOT_LOG_LEVEL` → observability.log_level
//! - `FINBOT_LOG_FORMAT` → observability.log_format
//! - `FINBOT_MODEL` → llm.model
//! - `FINBOT_GLOSSARY_PATH` → glossary.path
//! - `GEMINI_API_KEY` / `GOOGLE_API_KEY` → llm.api_key

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".finbot"),
        |dirs| dirs.home_dir().join(".finbot"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// Listener configuration.
///
/// Default is `127.0.0.1:5000` (local only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Set to "0.0.0.0" for remote access.
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5000
}

// ============================================================================
// LLM Configuration
// ============================================================================

/// Remote completion service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Gemini model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key (falls back to GEMINI_API_KEY / GOOGLE_API_KEY)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override for the Generative Language API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Maximum output tokens per reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Number of retries on retryable failures
    #[serde(default = "default_llm_retries")]
    pub retries: u32,

    /// Base backoff between retries in milliseconds (doubles per attempt)
    #[serde(default = "default_llm_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_llm_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
            retries: default_llm_retries(),
            base_backoff_ms: default_llm_backoff_ms(),
            max_backoff_ms: default_llm_max_backoff_ms(),
        }
    }
}

impl LlmConfig {
    /// Per-attempt timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> i64 {
    1024
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_llm_retries() -> u32 {
    2
}

fn default_llm_backoff_ms() -> u64 {
    200
}

fn default_llm_max_backoff_ms() -> u64 {
    5_000
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Conversation store limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Store ceiling; pruning kicks in once this is exceeded
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// How far below the ceiling pruning shrinks the store
    #[serde(default = "default_evict_batch")]
    pub evict_batch: usize,

    /// Number of recent turns rendered into the prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            evict_batch: default_evict_batch(),
            history_window: default_history_window(),
        }
    }
}

fn default_max_sessions() -> usize {
    1000
}

fn default_evict_batch() -> usize {
    100
}

fn default_history_window() -> usize {
    5
}

// ============================================================================
// Glossary / Server / Observability
// ============================================================================

/// Glossary source configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlossaryConfig {
    /// JSON file of `{ "term": "definition" }`. Uses the built-in glossary when unset;
    /// the built-in glossary is written here if the file does not exist yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl GlossaryConfig {
    /// Resolve the configured path, expanding a leading `~/`.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.as_deref().map(expand_home)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Maximum accepted request body in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_body_limit() -> usize {
    64 * 1024
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets pinned to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub glossary: GlossaryConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("FINBOT_PORT") {
            if let Ok(p) = port.parse() {
                self.network.port = p;
            }
        }

        if let Ok(bind) = std::env::var("FINBOT_BIND_ADDRESS") {
            self.network.bind = bind;
        }

        if let Ok(level) = std::env::var("FINBOT_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Ok(format) = std::env::var("FINBOT_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        if let Ok(model) = std::env::var("FINBOT_MODEL") {
            self.llm.model = model;
        }

        if let Ok(path) = std::env::var("FINBOT_GLOSSARY_PATH") {
            self.glossary.path = Some(path);
        }

        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"));
        if let Ok(key) = api_key {
            if !key.is_empty() {
                self.llm.api_key = Some(key);
            }
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).with_context(|| {
                    format!("Failed to create config directory {}", dir.display())
                })?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Get the effective bind address.
    pub fn bind_address(&self) -> &str {
        &self.network.bind
    }

    /// Get the listen port.
    pub fn port(&self) -> u16 {
        self.network.port
    }

    /// Get the service endpoint URL, e.g. "http://127.0.0.1:5000".
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.bind_address(), self.port())
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::UserDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}
