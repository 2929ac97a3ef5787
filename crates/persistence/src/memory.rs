//! In-memory stores
//!
//! Default backend for single-process deployments and the backing store of
//! every agent test. Contacts keep insertion order so listings and text
//! search results are stable.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use contact_agent_core::{
    cosine_similarity, BridgeHit, Contact, ContactStore, MentionedConnection, NewUser,
    RegistrationFlow, RegistrationFlowStore, Result, ScoredContact, Tag, User, UserStore,
};

use crate::PersistenceError;

#[derive(Default)]
struct ContactTables {
    contacts: Vec<Contact>,
    embeddings: HashMap<Uuid, Vec<f32>>,
    tags: Vec<Tag>,
    contact_tags: HashMap<Uuid, Vec<Uuid>>,
    mentions: Vec<MentionedConnection>,
}

impl ContactTables {
    fn owned_by(&self, owner_id: Uuid) -> impl Iterator<Item = &Contact> {
        self.contacts.iter().filter(move |c| c.owner_id == owner_id)
    }
}

/// Contacts, tags and mentions held in process memory
#[derive(Default)]
pub struct InMemoryContactStore {
    tables: RwLock<ContactTables>,
}

impl InMemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contact_count(&self) -> usize {
        self.tables.read().contacts.len()
    }
}

#[async_trait]
impl ContactStore for InMemoryContactStore {
    async fn list_contacts(&self, owner_id: Uuid) -> Result<Vec<Contact>> {
        Ok(self.tables.read().owned_by(owner_id).cloned().collect())
    }

    async fn get_contact(&self, owner_id: Uuid, contact_id: Uuid) -> Result<Option<Contact>> {
        Ok(self
            .tables
            .read()
            .owned_by(owner_id)
            .find(|c| c.id == contact_id)
            .cloned())
    }

    async fn find_by_phone(
        &self,
        owner_id: Uuid,
        variants: &[String],
    ) -> Result<Option<Contact>> {
        Ok(self
            .tables
            .read()
            .owned_by(owner_id)
            .find(|c| {
                c.phone
                    .as_deref()
                    .map(|p| variants.iter().any(|v| v == p))
                    .unwrap_or(false)
            })
            .cloned())
    }

    async fn find_by_name(&self, owner_id: Uuid, name: &str) -> Result<Option<Contact>> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(None);
        }
        Ok(self
            .tables
            .read()
            .owned_by(owner_id)
            .find(|c| c.name.trim().to_lowercase() == wanted)
            .cloned())
    }

    async fn insert_contact(&self, contact: Contact) -> Result<Contact> {
        let mut tables = self.tables.write();
        if tables.contacts.iter().any(|c| c.id == contact.id) {
            return Err(PersistenceError::Conflict(format!("contact {} exists", contact.id)).into());
        }
        tables.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn update_contact(&self, contact: Contact) -> Result<Contact> {
        let mut tables = self.tables.write();
        let slot = tables
            .contacts
            .iter_mut()
            .find(|c| c.id == contact.id && c.owner_id == contact.owner_id)
            .ok_or_else(|| PersistenceError::NotFound(format!("contact {}", contact.id)))?;
        *slot = contact.clone();
        Ok(contact)
    }

    async fn search_text(&self, owner_id: Uuid, term: &str, limit: usize) -> Result<Vec<Contact>> {
        Ok(self
            .tables
            .read()
            .owned_by(owner_id)
            .filter(|c| c.matches_text(term))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn set_embedding(&self, contact_id: Uuid, embedding: Vec<f32>) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.contacts.iter().any(|c| c.id == contact_id) {
            return Err(PersistenceError::NotFound(format!("contact {}", contact_id)).into());
        }
        tables.embeddings.insert(contact_id, embedding);
        Ok(())
    }

    async fn search_by_embedding(
        &self,
        owner_id: Uuid,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredContact>> {
        let tables = self.tables.read();
        let mut scored: Vec<ScoredContact> = tables
            .owned_by(owner_id)
            .filter_map(|c| {
                tables.embeddings.get(&c.id).map(|embedding| ScoredContact {
                    contact: c.clone(),
                    score: cosine_similarity(query, embedding),
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn find_or_create_tag(&self, owner_id: Uuid, slug: &str, label: &str) -> Result<Tag> {
        let mut tables = self.tables.write();
        if let Some(tag) = tables
            .tags
            .iter()
            .find(|t| t.owner_id == owner_id && t.slug == slug)
        {
            return Ok(tag.clone());
        }
        let tag = Tag::new(owner_id, slug, label);
        tables.tags.push(tag.clone());
        Ok(tag)
    }

    async fn attach_tag(&self, contact_id: Uuid, tag_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write();
        let attached = tables.contact_tags.entry(contact_id).or_default();
        if attached.contains(&tag_id) {
            return Ok(false);
        }
        attached.push(tag_id);
        Ok(true)
    }

    async fn tags_for_contact(&self, contact_id: Uuid) -> Result<Vec<Tag>> {
        let tables = self.tables.read();
        let ids = match tables.contact_tags.get(&contact_id) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| tables.tags.iter().find(|t| t.id == *id))
            .cloned()
            .collect())
    }

    async fn list_mentions(&self, contact_id: Uuid) -> Result<Vec<MentionedConnection>> {
        Ok(self
            .tables
            .read()
            .mentions
            .iter()
            .filter(|m| m.contact_id == contact_id)
            .cloned()
            .collect())
    }

    async fn insert_mention(&self, mention: MentionedConnection) -> Result<MentionedConnection> {
        self.tables.write().mentions.push(mention.clone());
        Ok(mention)
    }

    async fn update_mention(&self, mention: MentionedConnection) -> Result<MentionedConnection> {
        let mut tables = self.tables.write();
        let slot = tables
            .mentions
            .iter_mut()
            .find(|m| m.id == mention.id)
            .ok_or_else(|| PersistenceError::NotFound(format!("mention {}", mention.id)))?;
        *slot = mention.clone();
        Ok(mention)
    }

    async fn search_mentions(
        &self,
        owner_id: Uuid,
        term: &str,
        limit: usize,
    ) -> Result<Vec<BridgeHit>> {
        let tables = self.tables.read();
        let mut hits = Vec::new();
        for contact in tables.owned_by(owner_id) {
            for mention in tables
                .mentions
                .iter()
                .filter(|m| m.contact_id == contact.id && m.matches_text(term))
            {
                hits.push(BridgeHit {
                    connection: mention.clone(),
                    via: contact.clone(),
                });
                if hits.len() >= limit {
                    return Ok(hits);
                }
            }
        }
        Ok(hits)
    }
}

/// Users held in process memory
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let wanted = email.trim().to_lowercase();
        Ok(self
            .users
            .read()
            .iter()
            .find(|u| u.email.to_lowercase() == wanted)
            .cloned())
    }

    async fn find_by_phone(&self, variants: &[String]) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .iter()
            .find(|u| {
                u.phone
                    .as_deref()
                    .map(|p| variants.iter().any(|v| v == p))
                    .unwrap_or(false)
            })
            .cloned())
    }

    async fn get(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().iter().find(|u| u.id == user_id).cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User> {
        let mut users = self.users.write();
        let email = new_user.email.trim().to_lowercase();
        if users.iter().any(|u| u.email.to_lowercase() == email) {
            return Err(
                PersistenceError::Conflict(format!("email {} already registered", email)).into(),
            );
        }
        let user = new_user.into_user();
        tracing::debug!(user_id = %user.id, "User created");
        users.push(user.clone());
        Ok(user)
    }
}

/// Registration flows keyed by canonical phone
#[derive(Default)]
pub struct InMemoryRegistrationFlowStore {
    flows: RwLock<HashMap<String, RegistrationFlow>>,
}

impl InMemoryRegistrationFlowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistrationFlowStore for InMemoryRegistrationFlowStore {
    async fn get(&self, phone: &str) -> Result<Option<RegistrationFlow>> {
        Ok(self.flows.read().get(phone).cloned())
    }

    async fn save(&self, flow: &RegistrationFlow) -> Result<()> {
        self.flows.write().insert(flow.phone.clone(), flow.clone());
        Ok(())
    }

    async fn list_open(&self) -> Result<Vec<RegistrationFlow>> {
        Ok(self
            .flows
            .read()
            .values()
            .filter(|f| !f.step.is_terminal())
            .cloned()
            .collect())
    }
}
