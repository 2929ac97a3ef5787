//! Transient extraction output
//!
//! Produced per extraction call, consumed by resolution and merge, then
//! discarded. Never persisted as-is.

use serde::{Deserialize, Serialize};

use crate::contact::ContactField;

/// Structured contact fields pulled out of one message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContactData {
    pub name: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    /// Digits only; may not be canonical yet
    pub phone: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub context: Option<String>,
    pub tags: Vec<String>,
    /// Model-reported confidence in [0, 1]
    pub confidence: f32,
}

impl ExtractedContactData {
    /// Create with just a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Check if nothing usable was extracted
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.company.is_none()
            && self.position.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.location.is_none()
            && self.context.is_none()
            && self.tags.is_empty()
    }

    /// Value for a contact field, if extracted
    pub fn field(&self, field: ContactField) -> Option<&str> {
        match field {
            ContactField::Name => self.name.as_deref(),
            ContactField::Phone => self.phone.as_deref(),
            ContactField::Email => self.email.as_deref(),
            ContactField::Company => self.company.as_deref(),
            ContactField::Position => self.position.as_deref(),
            ContactField::Location => self.location.as_deref(),
            ContactField::Context => self.context.as_deref(),
            ContactField::Notes => None,
        }
    }

    /// Best term for looking this person up: name, then company
    pub fn search_term(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.company.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Secondary person mentioned alongside the primary subject
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MentionedPerson {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_empty() {
        assert!(ExtractedContactData::default().is_empty());
        assert!(!ExtractedContactData::named("Ana").is_empty());

        let tags_only = ExtractedContactData {
            tags: vec!["investidor".to_string()],
            ..Default::default()
        };
        assert!(!tags_only.is_empty());
    }

    #[test]
    fn test_search_term_falls_back_to_company() {
        let data = ExtractedContactData {
            company: Some("Acme".to_string()),
            ..Default::default()
        };
        assert_eq!(data.search_term(), Some("Acme"));
        assert_eq!(ExtractedContactData::named("Bia").search_term(), Some("Bia"));
        assert_eq!(ExtractedContactData::default().search_term(), None);
    }
}
