//! Collaborator traits for the contact agent
//!
//! Everything the pipeline talks to outside its own process sits behind one
//! of these traits so backends can be swapped by configuration and mocked in
//! tests.
//!
//! ```text
//! Inference:
//!   - TextInferenceClient: prompt + text → completion / label
//!   - EmbeddingClient: text → vector
//!
//! Storage:
//!   - ContactStore: owner-scoped contacts, tags, mentioned connections
//!   - UserStore: users by email / phone variants
//!   - RegistrationFlowStore: per-phone registration state
//!
//! Messaging:
//!   - MessagingClient: outbound text to a phone
//! ```

mod inference;
mod messaging;
mod stores;

pub use inference::{cosine_similarity, EmbeddingClient, InferenceParams, TextInferenceClient};
pub use messaging::MessagingClient;
pub use stores::{ContactStore, RegistrationFlowStore, UserStore};
