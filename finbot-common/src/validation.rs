//! Configuration validation for FinBot services.
//!
//! Provides validation logic for configuration fields to ensure
//! all required values are present and within valid ranges.

use thiserror::Error;

use crate::config::{
    Config, GlossaryConfig, LlmConfig, NetworkConfig, ObservabilityConfig, ServerConfig,
    SessionConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 6] = [
            &self.network,
            &self.llm,
            &self.session,
            &self.glossary,
            &self.server,
            &self.observability,
        ];

        let mut errors: Vec<ValidationError> = sections
            .iter()
            .filter_map(|section| section.validate().err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load (with env overrides) and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "network.port".into(),
            });
        }

        if self.bind.parse::<std::net::IpAddr>().is_err() {
            return Err(ValidationError::InvalidValue {
                field: "network.bind".into(),
                reason: format!("not an IP address: {}", self.bind),
            });
        }

        Ok(())
    }
}

impl Validate for LlmConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "llm.model".into(),
            });
        }

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "llm.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::InvalidValue {
                field: "llm.temperature".into(),
                reason: "must be between 0.0 and 2.0".into(),
            });
        }

        if self.max_tokens <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "llm.max_tokens".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(ValidationError::Conflict {
                reason: "llm.base_backoff_ms exceeds llm.max_backoff_ms".into(),
            });
        }

        Ok(())
    }
}

impl Validate for SessionConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.max_sessions == 0 {
            return Err(ValidationError::InvalidValue {
                field: "session.max_sessions".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.evict_batch > self.max_sessions {
            return Err(ValidationError::Conflict {
                reason: format!(
                    "session.evict_batch ({}) exceeds session.max_sessions ({})",
                    self.evict_batch, self.max_sessions
                ),
            });
        }

        if self.history_window == 0 {
            return Err(ValidationError::InvalidValue {
                field: "session.history_window".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(())
    }
}

impl Validate for GlossaryConfig {
    fn validate(&self) -> ValidationResult<()> {
        if let Some(ref path) = self.path {
            if path.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "glossary.path".into(),
                    reason: "must not be empty when set".into(),
                });
            }
        }

        Ok(())
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.body_limit_bytes < 1024 {
            return Err(ValidationError::InvalidValue {
                field: "server.body_limit_bytes".into(),
                reason: "must be at least 1024".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.observability.log_level = "invalid".into();
        let result = config.validate();
        assert!(result.is_err());
        if let Err(ValidationError::InvalidValue { field, .. }) = result {
            assert_eq!(field, "observability.log_level");
        }
    }

    #[test]
    fn test_zero_port() {
        let mut config = Config::default();
        config.network.port = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPort { port: 0, .. })
        ));
    }

    #[test]
    fn test_evict_batch_larger_than_ceiling() {
        let mut config = Config::default();
        config.session.max_sessions = 10;
        config.session.evict_batch = 11;
        let result = config.validate();
        if let Err(ValidationError::Conflict { reason }) = result {
            assert!(reason.contains("evict_batch"));
        } else {
            panic!("expected conflict, got {result:?}");
        }
    }

    #[test]
    fn test_zero_history_window() {
        let mut config = Config::default();
        config.session.history_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_llm_timeout_validation() {
        let mut config = Config::default();
        config.llm.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multiple_errors_are_aggregated() {
        let mut config = Config::default();
        config.network.port = 0;
        config.observability.log_format = "xml".into();
        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_bind_address() {
        let mut config = Config::default();
        config.network.bind = "localhost:5000".into();
        assert!(config.validate().is_err());
    }
}
