//! Text-inference and embedding backends
//!
//! Features:
//! - Ollama (`/api/chat`) and OpenAI-compatible (`/chat/completions`) backends
//! - Ollama embeddings (`/api/embed`)
//! - Retries with exponential backoff for transient failures
//! - Factory that builds clients from `Settings`

pub mod backend;
pub mod embeddings;
pub mod factory;
pub mod prompt;

pub use backend::{LlmConfig, OllamaBackend, OpenAIBackend, OpenAIConfig};
pub use embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use factory::{create_embedding_client, create_inference_client};
pub use prompt::{Message, Role};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for contact_agent_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout => contact_agent_core::Error::Timeout("inference".to_string()),
            LlmError::Configuration(msg) => contact_agent_core::Error::Config(msg),
            other => contact_agent_core::Error::Inference(other.to_string()),
        }
    }
}
