//! ScyllaDB schema creation

use crate::client::qualified;
use crate::error::PersistenceError;
use scylla::Session;

pub const FLOWS_TABLE: &str = "registration_flows";

/// Rows outlive their flow's expiry so the sweeper can still mark them
/// abandoned; after this many seconds Scylla drops them.
pub const FLOW_ROW_TTL_SECONDS: u32 = 7 * 24 * 60 * 60;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // One row per canonical phone; the whole flow is a JSON payload
    let flows_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            phone TEXT,
            step TEXT,
            payload TEXT,
            expires_at BIGINT,
            updated_at BIGINT,
            PRIMARY KEY (phone)
        ) WITH default_time_to_live = {}
    "#,
        qualified(keyspace, FLOWS_TABLE),
        FLOW_ROW_TTL_SECONDS
    );

    session.query_unpaged(flows_table, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create {} table: {}", FLOWS_TABLE, e))
    })?;

    Ok(())
}
