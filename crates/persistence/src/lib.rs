//! Storage backends for the contact agent
//!
//! - In-memory contact, user and registration flow stores (default)
//! - ScyllaDB registration flow store for multi-instance deployments

pub mod client;
pub mod error;
pub mod flows;
pub mod memory;
pub mod schema;

pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use flows::ScyllaRegistrationFlowStore;
pub use memory::{InMemoryContactStore, InMemoryRegistrationFlowStore, InMemoryUserStore};

/// Connect to ScyllaDB, ensure the schema and build the flow store
pub async fn init(config: ScyllaConfig) -> Result<ScyllaRegistrationFlowStore, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;
    Ok(ScyllaRegistrationFlowStore::new(client))
}
