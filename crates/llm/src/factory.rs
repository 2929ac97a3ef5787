//! Client factory
//!
//! Builds inference and embedding clients from the current settings. A
//! configuration change means building new clients and a new service graph;
//! nothing here caches a client.

use std::sync::Arc;
use std::time::Duration;

use contact_agent_config::{EmbeddingsConfig, InferenceConfig, InferenceProvider};
use contact_agent_core::{EmbeddingClient, TextInferenceClient};

use crate::backend::{LlmConfig, OllamaBackend, OpenAIBackend, OpenAIConfig};
use crate::embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
use crate::LlmError;

/// Build the text-inference client selected by `config.provider`
pub fn create_inference_client(
    config: &InferenceConfig,
) -> Result<Arc<dyn TextInferenceClient>, LlmError> {
    let timeout = Duration::from_secs(config.timeout_seconds);

    let client: Arc<dyn TextInferenceClient> = match config.provider {
        InferenceProvider::Ollama => Arc::new(OllamaBackend::new(LlmConfig {
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            timeout,
            max_retries: config.max_retries,
            ..Default::default()
        })?),
        InferenceProvider::OpenAI => Arc::new(OpenAIBackend::new(OpenAIConfig {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            timeout,
            max_retries: config.max_retries,
            ..Default::default()
        })?),
    };

    tracing::info!(
        provider = ?config.provider,
        model = %client.model_name(),
        endpoint = %config.endpoint,
        "Inference client ready"
    );

    Ok(client)
}

/// Build the embedding client, or `None` when semantic search is disabled
pub fn create_embedding_client(
    config: &EmbeddingsConfig,
) -> Result<Option<Arc<dyn EmbeddingClient>>, LlmError> {
    if !config.enabled {
        tracing::info!("Embeddings disabled; semantic search will be skipped");
        return Ok(None);
    }

    let embedder = OllamaEmbedder::new(OllamaEmbeddingConfig {
        endpoint: config.endpoint.clone(),
        model: config.model.clone(),
        timeout: config.timeout(),
        ..Default::default()
    })?;

    tracing::info!(model = %config.model, "Embedding client ready");
    Ok(Some(Arc::new(embedder)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let config = InferenceConfig::default();
        let client = create_inference_client(&config).unwrap();
        assert_eq!(client.model_name(), config.model);
    }

    #[test]
    fn test_openai_requires_key_for_remote() {
        let config = InferenceConfig {
            provider: InferenceProvider::OpenAI,
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: None,
            ..Default::default()
        };
        assert!(create_inference_client(&config).is_err());

        let config = InferenceConfig {
            api_key: Some("sk-test".to_string()),
            ..config
        };
        assert!(create_inference_client(&config).is_ok());
    }

    #[test]
    fn test_embeddings_disabled() {
        let config = EmbeddingsConfig::default();
        assert!(create_embedding_client(&config).unwrap().is_none());

        let config = EmbeddingsConfig {
            enabled: true,
            ..Default::default()
        };
        let client = create_embedding_client(&config).unwrap().unwrap();
        assert_eq!(client.model_name(), "nomic-embed-text");
    }
}
