//! Scripted collaborators for tests and local runs
//!
//! These never touch the network; they let pipelines run deterministically.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use contact_agent_core::{
    EmbeddingClient, Error, InferenceParams, MessagingClient, Result, TextInferenceClient,
};

/// A recorded inference call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub text: String,
    pub params: InferenceParams,
}

/// Replays queued completions in order; an empty queue is an inference error
#[derive(Default)]
pub struct ScriptedInference {
    responses: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scripted = Self::new();
        for response in responses {
            scripted.push(response);
        }
        scripted
    }

    /// Sleep before answering every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, response: impl Into<String>) {
        self.responses.lock().push_back(Ok(response.into()));
    }

    pub fn push_error(&self, error: Error) {
        self.responses.lock().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl TextInferenceClient for ScriptedInference {
    async fn complete(
        &self,
        system_prompt: &str,
        text: &str,
        params: &InferenceParams,
    ) -> Result<String> {
        self.calls.lock().push(RecordedCall {
            system_prompt: system_prompt.to_string(),
            text: text.to_string(),
            params: *params,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Inference("no scripted response".to_string())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Keeps every outbound message
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record, then report a delivery failure
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn last_to(&self, phone: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|(to, _)| to == phone)
            .map(|(_, message)| message.clone())
    }
}

#[async_trait]
impl MessagingClient for RecordingMessenger {
    async fn send_text(&self, phone: &str, message: &str) -> Result<()> {
        self.sent.lock().push((phone.to_string(), message.to_string()));
        if self.fail {
            return Err(Error::Messaging("delivery refused".to_string()));
        }
        Ok(())
    }
}

/// Keyword-driven embeddings: the first keyword contained in the text picks
/// the vector, otherwise the fallback vector is returned
pub struct StaticEmbedder {
    keywords: Vec<(String, Vec<f32>)>,
    fallback: Vec<f32>,
    calls: Mutex<usize>,
}

impl StaticEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            keywords: Vec::new(),
            fallback,
            calls: Mutex::new(0),
        }
    }

    pub fn with_keyword(mut self, keyword: &str, vector: Vec<f32>) -> Self {
        self.keywords.push((keyword.to_lowercase(), vector));
        self
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl EmbeddingClient for StaticEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        *self.calls.lock() += 1;
        let lower = text.to_lowercase();
        Ok(self
            .keywords
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, vector)| vector.clone())
            .unwrap_or_else(|| self.fallback.clone()))
    }

    fn model_name(&self) -> &str {
        "static"
    }
}

/// Always unavailable
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingClient for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::Embedding("embedding service unavailable".to_string()))
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}
