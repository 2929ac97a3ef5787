//! Ollama Embeddings
//!
//! Uses Ollama's `/api/embed` endpoint for dense vectors over contact text.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use contact_agent_core::EmbeddingClient;

use crate::backend::with_retries;
use crate::LlmError;

/// Ollama embedding configuration
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingConfig {
    /// Ollama API endpoint
    pub endpoint: String,
    /// Model name
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            timeout: Duration::from_secs(5),
            max_retries: 1,
        }
    }
}

/// Request to Ollama embedding API
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Response from Ollama embedding API
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama embedder
pub struct OllamaEmbedder {
    client: Client,
    config: OllamaEmbeddingConfig,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaEmbeddingConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = EmbedRequest {
            model: &self.config.model,
            input: text,
        };
        let url = format!("{}/api/embed", self.config.endpoint.trim_end_matches('/'));

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = format!("Ollama embedding failed: {} - {}", status, body);
            return Err(if status.is_server_error() {
                LlmError::Network(message)
            } else {
                LlmError::Api(message)
            });
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse Ollama response: {}", e)))?;

        embed_response
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("No embedding returned".to_string()))
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedder {
    async fn embed(&self, text: &str) -> contact_agent_core::Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(contact_agent_core::Error::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }
        with_retries(self.config.max_retries, Duration::from_millis(100), || {
            self.embed_once(text)
        })
        .await
        .map_err(|e| contact_agent_core::Error::Embedding(e.to_string()))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = EmbedRequest {
            model: "nomic-embed-text",
            input: "Ana Souza | Acme",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "nomic-embed-text");
        assert_eq!(json["input"], "Ana Souza | Acme");
    }

    #[test]
    fn test_response_parse() {
        let body = r#"{"model":"m","embeddings":[[0.1,0.2,0.3]]}"#;
        let parsed: EmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.embeddings[0].len(), 3);
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let embedder = OllamaEmbedder::new(OllamaEmbeddingConfig::default()).unwrap();
        assert!(embedder.embed("   ").await.is_err());
    }
}
