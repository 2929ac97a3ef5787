//! Core traits and types for the contact agent
//!
//! This crate provides foundational types used across all other crates:
//! - Contact graph records (contacts, tags, mentioned connections)
//! - Transient extraction output
//! - Registration flow state
//! - Collaborator traits (inference, embeddings, stores, messaging)
//! - Error types

pub mod contact;
pub mod error;
pub mod extraction;
pub mod registration;
pub mod traits;
pub mod user;

pub use contact::{BridgeHit, Contact, ContactField, MentionedConnection, ScoredContact, Tag};
pub use error::{Error, Result};
pub use extraction::{ExtractedContactData, MentionedPerson};
pub use registration::{
    CollectedFields, HistoryMessage, HistoryRole, RegistrationFlow, RegistrationStep,
};
pub use user::{NewUser, User};

pub use traits::{
    cosine_similarity, ContactStore, EmbeddingClient, InferenceParams, MessagingClient,
    RegistrationFlowStore, TextInferenceClient, UserStore,
};
