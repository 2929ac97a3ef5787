//! Persistence error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        PersistenceError::Connection(err.to_string())
    }
}

impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        PersistenceError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::InvalidData(err.to_string())
    }
}

impl From<PersistenceError> for contact_agent_core::Error {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Conflict(msg) => contact_agent_core::Error::Conflict(msg),
            PersistenceError::NotFound(msg) => contact_agent_core::Error::NotFound(msg),
            other => contact_agent_core::Error::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_core_conflict() {
        let err: contact_agent_core::Error =
            PersistenceError::Conflict("email taken".into()).into();
        assert!(matches!(err, contact_agent_core::Error::Conflict(_)));

        let err: contact_agent_core::Error =
            PersistenceError::SchemaError("no keyspace".into()).into();
        assert!(matches!(err, contact_agent_core::Error::Storage(_)));
    }
}
