//! FinBot Common - Shared configuration, errors, and logging for FinBot services.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and their HTTP status mapping
//! - Logging setup and request metrics
//! - Small string utilities used across services

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    Config, GlossaryConfig, LlmConfig, NetworkConfig, ObservabilityConfig, ServerConfig,
    SessionConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
