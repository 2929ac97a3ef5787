//! Intent classification
//!
//! Two heuristic short-circuits (greetings, very short messages) and then a
//! single-label call to the text-inference collaborator. Every failure path
//! lands on [`Intent::Other`]; classification never blocks the pipeline.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use contact_agent_core::{InferenceParams, TextInferenceClient};
use contact_agent_text_processing::fold;

use crate::prompts::INTENT_PROMPT;

/// What the user wants from a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Look someone up
    Query,
    /// Data about a person to save
    ContactInfo,
    /// Change an existing record
    UpdateContact,
    /// Wants to add a contact, no data yet
    RegisterIntent,
    /// Greeting, acknowledgement, unrelated
    Other,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::Query,
        Intent::ContactInfo,
        Intent::UpdateContact,
        Intent::RegisterIntent,
        Intent::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Query => "query",
            Intent::ContactInfo => "contact_info",
            Intent::UpdateContact => "update_contact",
            Intent::RegisterIntent => "register_intent",
            Intent::Other => "other",
        }
    }

    /// Parse a collaborator label; unknown labels are `None`
    pub fn from_label(label: &str) -> Option<Intent> {
        let label = label.trim().to_lowercase();
        Intent::ALL.into_iter().find(|i| i.as_str() == label)
    }

    /// Intents that carry contact data worth extracting
    pub fn is_contact_bearing(&self) -> bool {
        matches!(self, Intent::ContactInfo | Intent::UpdateContact)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Greeting and acknowledgement tokens, already folded
pub const DEFAULT_GREETINGS: &[&str] = &[
    "oi",
    "oie",
    "ola",
    "opa",
    "e ai",
    "eai",
    "bom dia",
    "boa tarde",
    "boa noite",
    "tudo bem",
    "tudo bom",
    "obrigado",
    "obrigada",
    "obg",
    "valeu",
    "vlw",
    "ok",
    "okay",
    "beleza",
    "blz",
    "certo",
    "show",
    "legal",
    "tchau",
    "ate mais",
    "sim",
    "nao",
    "hi",
    "hello",
    "hey",
    "thanks",
    "thank you",
    "bye",
];

#[derive(Debug, Clone)]
pub struct IntentClassifierConfig {
    /// Messages shorter than this (in characters) are `other`
    pub min_length: usize,
    /// Greeting fast path only applies up to this many words
    pub max_greeting_words: usize,
    /// Bound on the inference call
    pub timeout: Duration,
    /// Folded greeting/acknowledgement tokens
    pub greetings: Vec<String>,
}

impl Default for IntentClassifierConfig {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_greeting_words: 3,
            timeout: Duration::from_secs(20),
            greetings: DEFAULT_GREETINGS.iter().map(|g| g.to_string()).collect(),
        }
    }
}

impl IntentClassifierConfig {
    /// True when the folded text is, or starts with, a greeting token
    pub fn is_greeting(&self, folded: &str) -> bool {
        self.greetings.iter().any(|greeting| {
            folded == greeting
                || folded
                    .strip_prefix(greeting.as_str())
                    .map(|rest| rest.starts_with(' '))
                    .unwrap_or(false)
        })
    }
}

pub struct IntentClassifier {
    client: Arc<dyn TextInferenceClient>,
    config: IntentClassifierConfig,
}

impl IntentClassifier {
    pub fn new(client: Arc<dyn TextInferenceClient>, config: IntentClassifierConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &IntentClassifierConfig {
        &self.config
    }

    /// Heuristic answer, if one applies
    pub fn fast_path(&self, text: &str) -> Option<Intent> {
        let folded = fold(text);
        let words = folded.split_whitespace().count();

        if words <= self.config.max_greeting_words && self.config.is_greeting(&folded) {
            return Some(Intent::Other);
        }
        if text.trim().chars().count() < self.config.min_length {
            return Some(Intent::Other);
        }
        None
    }

    pub async fn classify(&self, text: &str) -> Intent {
        if let Some(intent) = self.fast_path(text) {
            tracing::debug!(intent = %intent, "Intent from fast path");
            return intent;
        }

        let params = InferenceParams::classification();
        let call = self.client.classify(INTENT_PROMPT, text, &params);

        match tokio::time::timeout(self.config.timeout, call).await {
            Ok(Ok(label)) => match Intent::from_label(&label) {
                Some(intent) => {
                    tracing::debug!(intent = %intent, "Intent classified");
                    intent
                },
                None => {
                    tracing::debug!(label = %label, "Unknown intent label, defaulting to other");
                    Intent::Other
                },
            },
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Intent classification failed, defaulting to other");
                Intent::Other
            },
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Intent classification timed out, defaulting to other"
                );
                Intent::Other
            },
        }
    }
}
