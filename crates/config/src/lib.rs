//! Configuration management for the advisor service
//!
//! Supports loading configuration from:
//! - YAML files (config/default.yaml, config/{env}.yaml)
//! - Environment variables (SENTINEL__ prefix, `__` section separator)
//!
//! Secrets (API keys, database hosts) are never compiled in: they come from
//! the environment layer, with `ANTHROPIC_API_KEY` / `OPENAI_API_KEY` /
//! `SCYLLA_HOSTS` honored directly for operational convenience.
//!
//! The persona catalog lives in its own file (`config/personas.yaml` by
//! default) so care staff can review prompt text without touching server
//! settings.

pub mod personas;
pub mod settings;

pub use personas::PersonaCatalog;
pub use settings::{
    load_settings, AdvisorConfig, AuthConfig, EmbeddingsConfig, EscalationRuleConfig,
    EscalationConfig, LlmConfig, ObservabilityConfig, PersistenceConfig, RateLimitConfig,
    RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
