//! Users, as seen by the pipeline
//!
//! Users are owned by the surrounding application; the pipeline only looks
//! them up and creates them on completed registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Canonical phone
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a user at the end of registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: String,
    /// Random password the user is expected to change
    #[serde(skip_serializing)]
    pub temporary_password: String,
}

impl NewUser {
    pub fn into_user(self) -> User {
        User {
            id: Uuid::new_v4(),
            name: self.name,
            email: self.email,
            phone: Some(self.phone),
            created_at: Utc::now(),
        }
    }
}
