//! Storage collaborator traits
//!
//! All contact access is owner-scoped. Phone lookups take the full variant
//! list produced by the phone normalizer, never a single raw string.

use async_trait::async_trait;
use uuid::Uuid;

use crate::contact::{BridgeHit, Contact, MentionedConnection, ScoredContact, Tag};
use crate::registration::RegistrationFlow;
use crate::user::{NewUser, User};
use crate::Result;

/// Contacts, tags and mentioned connections
#[async_trait]
pub trait ContactStore: Send + Sync + 'static {
    /// All contacts of one owner
    async fn list_contacts(&self, owner_id: Uuid) -> Result<Vec<Contact>>;

    async fn get_contact(&self, owner_id: Uuid, contact_id: Uuid) -> Result<Option<Contact>>;

    /// First owner contact whose phone equals any of `variants`
    async fn find_by_phone(&self, owner_id: Uuid, variants: &[String])
        -> Result<Option<Contact>>;

    /// Case-insensitive exact name match
    async fn find_by_name(&self, owner_id: Uuid, name: &str) -> Result<Option<Contact>>;

    async fn insert_contact(&self, contact: Contact) -> Result<Contact>;

    async fn update_contact(&self, contact: Contact) -> Result<Contact>;

    /// Case-insensitive substring search over name/company/position/context/notes
    async fn search_text(&self, owner_id: Uuid, term: &str, limit: usize) -> Result<Vec<Contact>>;

    async fn set_embedding(&self, contact_id: Uuid, embedding: Vec<f32>) -> Result<()>;

    /// Owner contacts ranked by cosine similarity, best first
    async fn search_by_embedding(
        &self,
        owner_id: Uuid,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredContact>>;

    /// Reuse the owner's tag with `slug`, or create it with `label`
    async fn find_or_create_tag(&self, owner_id: Uuid, slug: &str, label: &str) -> Result<Tag>;

    /// Associate a tag with a contact; returns false if already associated
    async fn attach_tag(&self, contact_id: Uuid, tag_id: Uuid) -> Result<bool>;

    async fn tags_for_contact(&self, contact_id: Uuid) -> Result<Vec<Tag>>;

    async fn list_mentions(&self, contact_id: Uuid) -> Result<Vec<MentionedConnection>>;

    async fn insert_mention(&self, mention: MentionedConnection) -> Result<MentionedConnection>;

    async fn update_mention(&self, mention: MentionedConnection) -> Result<MentionedConnection>;

    /// Mentioned connections under any of the owner's contacts whose
    /// name, description or tags contain `term`
    async fn search_mentions(&self, owner_id: Uuid, term: &str, limit: usize)
        -> Result<Vec<BridgeHit>>;
}

/// Users (owned by the surrounding application)
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// First user whose phone equals any of `variants`
    async fn find_by_phone(&self, variants: &[String]) -> Result<Option<User>>;

    async fn get(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Create a user; `Error::Conflict` if the email is taken
    async fn create(&self, new_user: NewUser) -> Result<User>;
}

/// Registration flow records keyed by canonical phone
#[async_trait]
pub trait RegistrationFlowStore: Send + Sync + 'static {
    /// Latest flow for `phone`, terminal or not
    async fn get(&self, phone: &str) -> Result<Option<RegistrationFlow>>;

    async fn save(&self, flow: &RegistrationFlow) -> Result<()>;

    /// Flows that are not terminal (expired ones included)
    async fn list_open(&self) -> Result<Vec<RegistrationFlow>>;
}
