//! Registration flow store backed by ScyllaDB

use async_trait::async_trait;
use chrono::Utc;

use contact_agent_core::{RegistrationFlow, RegistrationFlowStore, Result};

use crate::schema::FLOWS_TABLE;
use crate::{PersistenceError, ScyllaClient};

/// Stores each flow as a JSON payload keyed by canonical phone
pub struct ScyllaRegistrationFlowStore {
    client: ScyllaClient,
}

impl ScyllaRegistrationFlowStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    fn decode(payload: &str) -> std::result::Result<RegistrationFlow, PersistenceError> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[async_trait]
impl RegistrationFlowStore for ScyllaRegistrationFlowStore {
    async fn get(&self, phone: &str) -> Result<Option<RegistrationFlow>> {
        let query = format!(
            "SELECT payload FROM {} WHERE phone = ?",
            self.client.table(FLOWS_TABLE)
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (phone,))
            .await
            .map_err(PersistenceError::from)?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                let (payload,): (String,) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                return Ok(Some(Self::decode(&payload)?));
            }
        }

        Ok(None)
    }

    async fn save(&self, flow: &RegistrationFlow) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (phone, step, payload, expires_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            self.client.table(FLOWS_TABLE)
        );
        let payload = serde_json::to_string(flow).map_err(PersistenceError::from)?;

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &flow.phone,
                    flow.step.as_str(),
                    payload,
                    flow.expires_at.timestamp_millis(),
                    Utc::now().timestamp_millis(),
                ),
            )
            .await
            .map_err(PersistenceError::from)?;

        tracing::debug!(phone = %flow.phone, step = flow.step.as_str(), "Registration flow saved");
        Ok(())
    }

    async fn list_open(&self) -> Result<Vec<RegistrationFlow>> {
        let query = format!("SELECT payload FROM {}", self.client.table(FLOWS_TABLE));

        let result = self
            .client
            .session()
            .query_unpaged(query, &[])
            .await
            .map_err(PersistenceError::from)?;

        let mut flows = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (payload,): (String,) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                match Self::decode(&payload) {
                    Ok(flow) if !flow.step.is_terminal() => flows.push(flow),
                    Ok(_) => {},
                    Err(e) => tracing::warn!(error = %e, "Skipping undecodable registration flow"),
                }
            }
        }

        Ok(flows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use contact_agent_core::RegistrationStep;

    #[test]
    fn test_decode_stored_payload() {
        let mut flow = RegistrationFlow::start(
            "5521987654321",
            RegistrationStep::Conversation,
            Utc::now(),
            Duration::hours(24),
        );
        flow.collected.name = Some("Ana".to_string());
        let payload = serde_json::to_string(&flow).unwrap();

        let decoded = ScyllaRegistrationFlowStore::decode(&payload).unwrap();
        assert_eq!(decoded, flow);
        assert!(ScyllaRegistrationFlowStore::decode("{not json").is_err());
    }
}
