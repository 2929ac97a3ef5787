//! Configuration management for the contact agent
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, then `config/{env}`)
//! - Environment variables (`CONTACT_AGENT` prefix, `__` separator)
//!
//! Every section is defaulted, so an empty configuration is a valid
//! development setup with in-memory storage and a local Ollama.

pub mod settings;

pub use settings::{
    load_settings, load_settings_from, EmbeddingsConfig, FlowConfig, FlowMode, InferenceConfig,
    InferenceProvider, NamesConfig, ObservabilityConfig, PersistenceConfig, PhoneConfig,
    ResolverConfig, RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
