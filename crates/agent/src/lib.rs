//! Contact agent
//!
//! Features:
//! - Intent classification with heuristic fast paths
//! - Strictly validated entity extraction via text inference
//! - Contact resolution (direct, semantic, substring, bridge, suggestions)
//! - Non-clobbering merge with tags, mentions and background embedding refresh
//! - Per-phone registration flow with fallback prompts and expiry sweep
//! - Top-level message pipeline tying it together

pub mod embedding_jobs;
pub mod extraction;
pub mod intent;
pub mod locks;
pub mod merge;
pub mod pipeline;
pub mod prompts;
pub mod registration;
pub mod replies;
pub mod resolver;
pub mod testing;

pub use embedding_jobs::{EmbeddingJob, EmbeddingJobQueue};
pub use extraction::{
    ConnectionsExtraction, EntityExtractor, ExtractionFailure, ExtractionResult,
    RegistrationExtraction, RegistrationTurn,
};
pub use intent::{Intent, IntentClassifier, IntentClassifierConfig};
pub use locks::KeyedLocks;
pub use merge::{MentionReport, MergeEngine, MergeReport, UpsertOutcome};
pub use pipeline::{InboundMessage, MessagePipeline, PipelineReply, ReplyKind};
pub use registration::{ConversationFlow, ConversationFlowConfig, FlowReply};
pub use resolver::{
    ContactResolver, MatchMethod, NetworkEdge, NetworkGraph, NetworkNode, NodeKind, Resolution,
};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Messaging error: {0}")]
    Messaging(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<contact_agent_core::Error> for AgentError {
    fn from(err: contact_agent_core::Error) -> Self {
        use contact_agent_core::Error;
        match err {
            Error::Storage(msg) | Error::NotFound(msg) | Error::Conflict(msg) => {
                AgentError::Storage(msg)
            },
            Error::Messaging(msg) => AgentError::Messaging(msg),
            Error::InvalidInput(msg) => AgentError::InvalidInput(msg),
            Error::Config(msg) => AgentError::Configuration(msg),
            other => AgentError::Internal(other.to_string()),
        }
    }
}

impl From<contact_agent_text_processing::TextProcessingError> for AgentError {
    fn from(err: contact_agent_text_processing::TextProcessingError) -> Self {
        AgentError::Configuration(err.to_string())
    }
}
