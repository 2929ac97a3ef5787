//! ScyllaDB session for the registration flow store

use std::sync::Arc;

use scylla::{Session, SessionBuilder};

use contact_agent_config::PersistenceConfig;

use crate::error::PersistenceError;
use crate::schema;

/// Longest keyspace name Scylla accepts
const MAX_KEYSPACE_LEN: usize = 48;

/// Connection settings, taken from [`PersistenceConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScyllaConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u8,
}

impl Default for ScyllaConfig {
    fn default() -> Self {
        Self::from(&PersistenceConfig::default())
    }
}

impl From<&PersistenceConfig> for ScyllaConfig {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            hosts: config.scylla_hosts.clone(),
            keyspace: config.keyspace.clone(),
            replication_factor: config.replication_factor,
        }
    }
}

impl ScyllaConfig {
    /// The keyspace is interpolated into CQL, so it must be a plain identifier
    pub fn validate(&self) -> Result<(), PersistenceError> {
        if self.hosts.iter().all(|h| h.trim().is_empty()) {
            return Err(PersistenceError::Connection("no ScyllaDB hosts configured".to_string()));
        }
        let valid_keyspace = self.keyspace.len() <= MAX_KEYSPACE_LEN
            && self.keyspace.starts_with(|c: char| c.is_ascii_alphabetic())
            && self.keyspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_keyspace {
            return Err(PersistenceError::SchemaError(format!(
                "invalid keyspace name {:?}",
                self.keyspace
            )));
        }
        if self.replication_factor == 0 {
            return Err(PersistenceError::SchemaError(
                "replication factor must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared session bound to one keyspace
#[derive(Clone)]
pub struct ScyllaClient {
    session: Arc<Session>,
    config: ScyllaConfig,
}

impl ScyllaClient {
    pub async fn connect(config: ScyllaConfig) -> Result<Self, PersistenceError> {
        config.validate()?;
        tracing::info!(hosts = ?config.hosts, keyspace = %config.keyspace, "Connecting to ScyllaDB");

        let hosts: Vec<&str> = config
            .hosts
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .collect();
        let session = SessionBuilder::new().known_nodes(&hosts).build().await?;

        Ok(Self {
            session: Arc::new(session),
            config,
        })
    }

    /// Create the keyspace and the registration flow table if missing
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        schema::create_keyspace(
            &self.session,
            &self.config.keyspace,
            self.config.replication_factor,
        )
        .await?;
        schema::create_tables(&self.session, &self.config.keyspace).await?;
        tracing::info!(keyspace = %self.config.keyspace, "Schema ensured");
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// `keyspace.table`, for use in CQL text
    pub fn table(&self, name: &str) -> String {
        qualified(&self.config.keyspace, name)
    }
}

pub(crate) fn qualified(keyspace: &str, table: &str) -> String {
    format!("{}.{}", keyspace, table)
}
