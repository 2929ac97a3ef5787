//! Text inference and embedding traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Per-call generation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceParams {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the backend for a JSON object response
    pub json_output: bool,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 512,
            json_output: false,
        }
    }
}

impl InferenceParams {
    /// Single-label classification: deterministic, a handful of tokens
    pub fn classification() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 10,
            json_output: false,
        }
    }

    /// Structured extraction: low temperature, JSON object out
    pub fn extraction() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 800,
            json_output: true,
        }
    }

    /// Conversational registration turn
    pub fn conversation() -> Self {
        Self {
            temperature: 0.5,
            max_tokens: 400,
            json_output: true,
        }
    }
}

/// Text-inference collaborator
///
/// Implementations:
/// - `OllamaBackend` - local Ollama `/api/chat`
/// - `OpenAIBackend` - any OpenAI-compatible `/chat/completions` endpoint
#[async_trait]
pub trait TextInferenceClient: Send + Sync + 'static {
    /// Run `text` against `system_prompt` and return the raw completion
    async fn complete(
        &self,
        system_prompt: &str,
        text: &str,
        params: &InferenceParams,
    ) -> Result<String>;

    /// Return a single lowercase label.
    ///
    /// Defaults to the first whitespace-delimited token of `complete`, with
    /// surrounding quotes and punctuation removed.
    async fn classify(
        &self,
        system_prompt: &str,
        text: &str,
        params: &InferenceParams,
    ) -> Result<String> {
        let raw = self.complete(system_prompt, text, params).await?;
        let token = raw
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
            .to_lowercase();
        Ok(token)
    }

    /// Model identifier, for logs
    fn model_name(&self) -> &str;
}

/// Text-embedding collaborator
#[async_trait]
pub trait EmbeddingClient: Send + Sync + 'static {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn model_name(&self) -> &str;
}

/// Cosine similarity of two vectors; 0.0 on length mismatch or zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(&'static str);

    #[async_trait]
    impl TextInferenceClient for Echo {
        async fn complete(&self, _: &str, _: &str, _: &InferenceParams) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_classify_takes_first_token() {
        let client = Echo("\"Contact_Info\". The message has a name");
        let label = client
            .classify("", "", &InferenceParams::classification())
            .await
            .unwrap();
        assert_eq!(label, "contact_info");
    }

    #[tokio::test]
    async fn test_classify_empty_completion() {
        let client = Echo("   ");
        let label = client.classify("", "", &InferenceParams::default()).await.unwrap();
        assert_eq!(label, "");
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }
}
