//! Contact graph records
//!
//! A `Contact` is owned by exactly one user. A `MentionedConnection` is a
//! lightweight "bridge" person referenced inside a contact's data and is never
//! owned by a user directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity record owned by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    /// Owning user
    pub owner_id: Uuid,
    /// Display name (required)
    pub name: String,
    /// Canonical phone (`<country><area><subscriber>`)
    pub phone: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub location: Option<String>,
    /// Free-text context, appended to on merge
    pub context: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Create a new contact with only a name
    pub fn new(owner_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            phone: None,
            email: None,
            company: None,
            position: None,
            location: None,
            context: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.position = Some(position.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Read a field value
    pub fn field(&self, field: ContactField) -> Option<&str> {
        match field {
            ContactField::Name => Some(self.name.as_str()),
            ContactField::Phone => self.phone.as_deref(),
            ContactField::Email => self.email.as_deref(),
            ContactField::Company => self.company.as_deref(),
            ContactField::Position => self.position.as_deref(),
            ContactField::Location => self.location.as_deref(),
            ContactField::Context => self.context.as_deref(),
            ContactField::Notes => self.notes.as_deref(),
        }
    }

    /// Text used to build the contact's search embedding
    pub fn searchable_text(&self) -> String {
        ContactField::ALL
            .iter()
            .filter(|f| f.is_searchable())
            .filter_map(|f| self.field(*f))
            .filter(|v| !v.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Case-insensitive substring match over the free-text search fields
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        [
            ContactField::Name,
            ContactField::Company,
            ContactField::Position,
            ContactField::Context,
            ContactField::Notes,
        ]
        .iter()
        .filter_map(|f| self.field(*f))
        .any(|v| v.to_lowercase().contains(&needle))
    }

    /// One-line summary for chat replies
    pub fn summary(&self) -> String {
        let mut parts = vec![self.name.clone()];
        match (&self.position, &self.company) {
            (Some(p), Some(c)) => parts.push(format!("{} @ {}", p, c)),
            (Some(p), None) => parts.push(p.clone()),
            (None, Some(c)) => parts.push(c.clone()),
            (None, None) => {},
        }
        if let Some(ref location) = self.location {
            parts.push(location.clone());
        }
        if let Some(ref phone) = self.phone {
            parts.push(phone.clone());
        }
        parts.join(" · ")
    }
}

/// Contact fields tracked by merges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactField {
    Name,
    Phone,
    Email,
    Company,
    Position,
    Location,
    Context,
    Notes,
}

impl ContactField {
    pub const ALL: [ContactField; 8] = [
        ContactField::Name,
        ContactField::Phone,
        ContactField::Email,
        ContactField::Company,
        ContactField::Position,
        ContactField::Location,
        ContactField::Context,
        ContactField::Notes,
    ];

    /// Fields that feed the search embedding; changing one requires a refresh
    pub fn is_searchable(&self) -> bool {
        matches!(
            self,
            ContactField::Name
                | ContactField::Company
                | ContactField::Position
                | ContactField::Location
                | ContactField::Context
                | ContactField::Notes
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactField::Name => "name",
            ContactField::Phone => "phone",
            ContactField::Email => "email",
            ContactField::Company => "company",
            ContactField::Position => "position",
            ContactField::Location => "location",
            ContactField::Context => "context",
            ContactField::Notes => "notes",
        }
    }
}

/// A person mentioned by a contact but not owned by any user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionedConnection {
    pub id: Uuid,
    /// Owning contact
    pub contact_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MentionedConnection {
    pub fn new(contact_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            contact_id,
            name: name.into(),
            description: None,
            tags: Vec::new(),
            phone: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive match on name, description or any tag
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        self.name.to_lowercase().contains(&needle)
            || self
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(&needle))
                .unwrap_or(false)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }
}

/// Owner-scoped tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Lowercase, diacritic-free, hyphenated
    pub slug: String,
    /// Label as first written
    pub label: String,
}

impl Tag {
    pub fn new(owner_id: Uuid, slug: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            slug: slug.into(),
            label: label.into(),
        }
    }
}

/// Contact ranked by embedding similarity
#[derive(Debug, Clone)]
pub struct ScoredContact {
    pub contact: Contact,
    pub score: f32,
}

/// Mentioned connection found through one of the owner's contacts
#[derive(Debug, Clone)]
pub struct BridgeHit {
    pub connection: MentionedConnection,
    /// The owner's contact that mentioned this person
    pub via: Contact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_searchable_text_skips_phone_and_email() {
        let mut contact = Contact::new(Uuid::new_v4(), "Ana Souza")
            .with_company("Acme")
            .with_phone("5521987654321");
        contact.email = Some("ana@acme.com".to_string());

        let text = contact.searchable_text();
        assert!(text.contains("Ana Souza"));
        assert!(text.contains("Acme"));
        assert!(!text.contains("5521987654321"));
        assert!(!text.contains("ana@acme.com"));
    }

    #[test]
    fn test_matches_text_case_insensitive() {
        let contact = Contact::new(Uuid::new_v4(), "Carlos Lima")
            .with_position("Advogado")
            .with_context("Conheci no evento de startups");

        assert!(contact.matches_text("advogado"));
        assert!(contact.matches_text("STARTUPS"));
        assert!(!contact.matches_text("medico"));
        assert!(!contact.matches_text("  "));
    }

    #[test]
    fn test_mention_matches_tags() {
        let mut mention = MentionedConnection::new(Uuid::new_v4(), "Paula");
        mention.tags = vec!["investidora".to_string()];
        assert!(mention.matches_text("Investidora"));
        assert!(mention.matches_text("paul"));
        assert!(!mention.matches_text("designer"));
    }

    #[test]
    fn test_summary() {
        let contact = Contact::new(Uuid::new_v4(), "João")
            .with_position("CTO")
            .with_company("XYZ");
        assert_eq!(contact.summary(), "João · CTO @ XYZ");
    }
}
