//! Create-or-update of extracted contact data
//!
//! Existing values are never overwritten: absent fields are filled and the
//! free-text context is appended. Tags and mentioned connections are written
//! after the contact itself; their failures are collected in the report and
//! leave the contact record intact.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use contact_agent_core::{
    Contact, ContactField, ContactStore, ExtractedContactData, MentionedConnection,
    MentionedPerson,
};
use contact_agent_text_processing::{slugify, PhoneNormalizer};

use crate::embedding_jobs::EmbeddingJobQueue;
use crate::locks::KeyedLocks;
use crate::resolver::{MatchMethod, Resolution};
use crate::AgentError;

/// Joins appended context notes
pub const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created {
        contact: Contact,
    },
    Updated {
        contact: Contact,
        changed: Vec<ContactField>,
    },
    Unchanged {
        contact: Contact,
    },
    /// Nothing to attach the data to and not enough to create a contact
    Skipped {
        reason: String,
    },
}

impl UpsertOutcome {
    pub fn contact(&self) -> Option<&Contact> {
        match self {
            UpsertOutcome::Created { contact }
            | UpsertOutcome::Updated { contact, .. }
            | UpsertOutcome::Unchanged { contact } => Some(contact),
            UpsertOutcome::Skipped { .. } => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Created { .. } => "created",
            UpsertOutcome::Updated { .. } => "updated",
            UpsertOutcome::Unchanged { .. } => "unchanged",
            UpsertOutcome::Skipped { .. } => "skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MentionReport {
    pub created: usize,
    pub updated: usize,
}

impl MentionReport {
    pub fn total(&self) -> usize {
        self.created + self.updated
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    pub outcome: UpsertOutcome,
    /// New tag associations
    pub tags_attached: usize,
    pub mentions: MentionReport,
    /// Tag/mention writes that failed; the contact itself was saved
    pub partial_failures: Vec<String>,
}

impl MergeReport {
    fn new(outcome: UpsertOutcome) -> Self {
        Self {
            outcome,
            tags_attached: 0,
            mentions: MentionReport::default(),
            partial_failures: Vec::new(),
        }
    }
}

/// Fill absent fields of `existing` from `data`; returns what changed.
///
/// Phone is only taken when it normalizes. Context is appended unless the
/// same note was already appended.
pub fn merge_fields(
    existing: &mut Contact,
    data: &ExtractedContactData,
    phones: &PhoneNormalizer,
) -> Vec<ContactField> {
    let mut changed = Vec::new();

    if is_blank(&existing.phone) {
        if let Some(canonical) = data.phone.as_deref().and_then(|p| phones.normalize(p)) {
            existing.phone = Some(canonical);
            changed.push(ContactField::Phone);
        }
    }

    for (field, slot) in [
        (ContactField::Email, &mut existing.email),
        (ContactField::Company, &mut existing.company),
        (ContactField::Position, &mut existing.position),
        (ContactField::Location, &mut existing.location),
    ] {
        if is_blank(slot) {
            if let Some(value) = data.field(field).map(str::trim).filter(|v| !v.is_empty()) {
                *slot = Some(value.to_string());
                changed.push(field);
            }
        }
    }

    if let Some(new) = data.context.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        match existing.context.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            None => {
                existing.context = Some(new.to_string());
                changed.push(ContactField::Context);
            },
            Some(old) if !has_note(old, new) => {
                existing.context = Some(format!("{}{}{}", old, CONTEXT_SEPARATOR, new));
                changed.push(ContactField::Context);
            },
            Some(_) => {},
        }
    }

    if !changed.is_empty() {
        existing.updated_at = Utc::now();
    }
    changed
}

fn has_note(context: &str, note: &str) -> bool {
    context.split(CONTEXT_SEPARATOR).any(|existing| existing.trim() == note)
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true)
}

pub struct MergeEngine {
    contacts: Arc<dyn ContactStore>,
    phones: PhoneNormalizer,
    jobs: Option<EmbeddingJobQueue>,
    locks: KeyedLocks,
}

impl MergeEngine {
    pub fn new(contacts: Arc<dyn ContactStore>, phones: PhoneNormalizer) -> Self {
        Self {
            contacts,
            phones,
            jobs: None,
            locks: KeyedLocks::new(),
        }
    }

    /// Refresh embeddings in the background after searchable changes
    pub fn with_embedding_jobs(mut self, jobs: EmbeddingJobQueue) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Find by phone, then by exact name; update it or create a new contact
    pub async fn upsert(
        &self,
        owner_id: Uuid,
        data: &ExtractedContactData,
    ) -> Result<MergeReport, AgentError> {
        let guard = self.locks.lock(&owner_id.to_string()).await;
        let result = self.upsert_locked(owner_id, data).await;
        self.release(guard);
        result
    }

    /// Merge according to a resolution. A phone match still wins over the
    /// resolved contact; otherwise a name match is updated and anything
    /// else goes through [`MergeEngine::upsert`].
    ///
    /// Text and semantic hits are treated like no match: the data is saved
    /// by phone or exact name, never onto the hit.
    pub async fn apply(
        &self,
        owner_id: Uuid,
        resolution: &Resolution,
        data: &ExtractedContactData,
    ) -> Result<MergeReport, AgentError> {
        let guard = self.locks.lock(&owner_id.to_string()).await;
        let result = self.apply_locked(owner_id, resolution, data).await;
        self.release(guard);
        result
    }

    async fn apply_locked(
        &self,
        owner_id: Uuid,
        resolution: &Resolution,
        data: &ExtractedContactData,
    ) -> Result<MergeReport, AgentError> {
        if let Some(existing) = self.find_by_phone(owner_id, data).await? {
            return self.merge_locked(existing, data).await;
        }
        match resolution {
            Resolution::Direct {
                contact,
                method: MatchMethod::Name,
                ..
            } => {
                let fresh = self
                    .contacts
                    .get_contact(owner_id, contact.id)
                    .await?
                    .unwrap_or_else(|| contact.clone());
                self.merge_locked(fresh, data).await
            },
            _ => self.upsert_locked(owner_id, data).await,
        }
    }

    /// [`MergeEngine::apply`], then save the mentioned people under the
    /// resulting contact
    pub async fn apply_with_mentions(
        &self,
        owner_id: Uuid,
        resolution: &Resolution,
        data: &ExtractedContactData,
        mentioned: &[MentionedPerson],
    ) -> Result<MergeReport, AgentError> {
        let mut report = self.apply(owner_id, resolution, data).await?;
        if let Some(contact_id) = report.outcome.contact().map(|c| c.id) {
            let (mentions, failures) = self.upsert_mentions(contact_id, mentioned).await;
            report.mentions = mentions;
            report.partial_failures.extend(failures);
        }
        Ok(report)
    }

    /// Merge into a known contact (re-read under the owner lock)
    pub async fn merge_into(
        &self,
        contact: &Contact,
        data: &ExtractedContactData,
    ) -> Result<MergeReport, AgentError> {
        let guard = self.locks.lock(&contact.owner_id.to_string()).await;
        let result = match self.contacts.get_contact(contact.owner_id, contact.id).await {
            Ok(Some(fresh)) => self.merge_locked(fresh, data).await,
            Ok(None) => Err(AgentError::Storage(format!("contact {} not found", contact.id))),
            Err(e) => Err(e.into()),
        };
        self.release(guard);
        result
    }

    /// Unlock and drop lock entries no other merge is waiting on
    fn release(&self, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.locks.prune();
    }

    async fn upsert_locked(
        &self,
        owner_id: Uuid,
        data: &ExtractedContactData,
    ) -> Result<MergeReport, AgentError> {
        if let Some(existing) = self.find_by_phone(owner_id, data).await? {
            return self.merge_locked(existing, data).await;
        }
        if let Some(name) = non_blank(data.name.as_deref()) {
            if let Some(existing) = self.contacts.find_by_name(owner_id, name).await? {
                return self.merge_locked(existing, data).await;
            }
        }
        self.create_locked(owner_id, data).await
    }

    async fn find_by_phone(
        &self,
        owner_id: Uuid,
        data: &ExtractedContactData,
    ) -> Result<Option<Contact>, AgentError> {
        let variants = match data.phone.as_deref() {
            Some(phone) => self.phones.variants(phone),
            None => return Ok(None),
        };
        if variants.is_empty() {
            return Ok(None);
        }
        Ok(self.contacts.find_by_phone(owner_id, &variants).await?)
    }

    async fn create_locked(
        &self,
        owner_id: Uuid,
        data: &ExtractedContactData,
    ) -> Result<MergeReport, AgentError> {
        let name = match non_blank(data.name.as_deref()) {
            Some(name) => name,
            None => {
                tracing::debug!(owner_id = %owner_id, "No match and no name, not creating a contact");
                return Ok(MergeReport::new(UpsertOutcome::Skipped {
                    reason: "no existing contact and no name to create one".to_string(),
                }));
            },
        };

        let mut contact = Contact::new(owner_id, name);
        merge_fields(&mut contact, data, &self.phones);
        if data.phone.is_some() && contact.phone.is_none() {
            tracing::debug!(owner_id = %owner_id, "Extracted phone does not normalize, dropped");
        }
        let contact = self.contacts.insert_contact(contact).await?;
        tracing::info!(owner_id = %owner_id, contact_id = %contact.id, "Contact created");

        self.schedule_embedding(&contact);
        let mut report = MergeReport::new(UpsertOutcome::Created {
            contact: contact.clone(),
        });
        self.attach_tags(&mut report, owner_id, contact.id, &data.tags).await;
        Ok(report)
    }

    async fn merge_locked(
        &self,
        mut contact: Contact,
        data: &ExtractedContactData,
    ) -> Result<MergeReport, AgentError> {
        let owner_id = contact.owner_id;
        let contact_id = contact.id;
        let changed = merge_fields(&mut contact, data, &self.phones);

        let outcome = if changed.is_empty() {
            UpsertOutcome::Unchanged { contact }
        } else {
            let contact = self.contacts.update_contact(contact).await?;
            tracing::info!(
                owner_id = %owner_id,
                contact_id = %contact_id,
                changed = ?changed,
                "Contact updated"
            );
            if changed.iter().any(|f| f.is_searchable()) {
                self.schedule_embedding(&contact);
            }
            UpsertOutcome::Updated { contact, changed }
        };

        let mut report = MergeReport::new(outcome);
        self.attach_tags(&mut report, owner_id, contact_id, &data.tags).await;
        Ok(report)
    }

    async fn attach_tags(
        &self,
        report: &mut MergeReport,
        owner_id: Uuid,
        contact_id: Uuid,
        tags: &[String],
    ) {
        let (attached, failures) = self.apply_tags(owner_id, contact_id, tags).await;
        report.tags_attached += attached;
        report.partial_failures.extend(failures);
    }

    /// Slugify, find-or-create and attach each tag. Returns new associations
    /// and the failures.
    pub async fn apply_tags(
        &self,
        owner_id: Uuid,
        contact_id: Uuid,
        tags: &[String],
    ) -> (usize, Vec<String>) {
        let mut attached = 0;
        let mut failures = Vec::new();

        for label in tags {
            let label = label.trim();
            let slug = slugify(label);
            if slug.is_empty() {
                continue;
            }
            let result = async {
                let tag = self.contacts.find_or_create_tag(owner_id, &slug, label).await?;
                self.contacts.attach_tag(contact_id, tag.id).await
            }
            .await;
            match result {
                Ok(true) => attached += 1,
                Ok(false) => {},
                Err(e) => {
                    tracing::warn!(contact_id = %contact_id, tag = %slug, error = %e, "Failed to attach tag");
                    failures.push(format!("tag {}: {}", slug, e));
                },
            }
        }
        (attached, failures)
    }

    /// Create or update mentioned connections under `contact_id`, matched by
    /// case-insensitive name. Absent description/phone are filled; a
    /// non-empty tag list replaces the old one.
    pub async fn upsert_mentions(
        &self,
        contact_id: Uuid,
        people: &[MentionedPerson],
    ) -> (MentionReport, Vec<String>) {
        let mut report = MentionReport::default();
        let mut failures = Vec::new();
        if people.is_empty() {
            return (report, failures);
        }

        let mut existing = match self.contacts.list_mentions(contact_id).await {
            Ok(existing) => existing,
            Err(e) => {
                tracing::warn!(contact_id = %contact_id, error = %e, "Failed to load mentions");
                failures.push(format!("mentions: {}", e));
                return (report, failures);
            },
        };

        for person in people {
            let name = person.name.trim();
            if name.is_empty() {
                continue;
            }
            let key = name.to_lowercase();
            let phone = person
                .phone
                .as_deref()
                .map(|p| self.phones.normalize(p).unwrap_or_else(|| p.to_string()));

            match existing.iter().position(|m| m.name.trim().to_lowercase() == key) {
                Some(index) => {
                    let mut mention = existing[index].clone();
                    if merge_mention(&mut mention, person, phone) {
                        match self.contacts.update_mention(mention).await {
                            Ok(saved) => {
                                existing[index] = saved;
                                report.updated += 1;
                            },
                            Err(e) => {
                                tracing::warn!(contact_id = %contact_id, mention = %name, error = %e, "Failed to update mention");
                                failures.push(format!("mention {}: {}", name, e));
                            },
                        }
                    }
                },
                None => {
                    let mut mention = MentionedConnection::new(contact_id, name);
                    mention.description = person.description.clone();
                    mention.tags = person.tags.clone();
                    mention.phone = phone;
                    match self.contacts.insert_mention(mention).await {
                        Ok(saved) => {
                            existing.push(saved);
                            report.created += 1;
                        },
                        Err(e) => {
                            tracing::warn!(contact_id = %contact_id, mention = %name, error = %e, "Failed to create mention");
                            failures.push(format!("mention {}: {}", name, e));
                        },
                    }
                },
            }
        }

        tracing::debug!(
            contact_id = %contact_id,
            created = report.created,
            updated = report.updated,
            "Mentions saved"
        );
        (report, failures)
    }

    fn schedule_embedding(&self, contact: &Contact) {
        if let Some(ref jobs) = self.jobs {
            jobs.schedule(contact);
        }
    }
}

fn merge_mention(
    mention: &mut MentionedConnection,
    person: &MentionedPerson,
    phone: Option<String>,
) -> bool {
    let mut changed = false;
    if is_blank(&mention.description) {
        if let Some(description) = non_blank(person.description.as_deref()) {
            mention.description = Some(description.to_string());
            changed = true;
        }
    }
    if is_blank(&mention.phone) && phone.is_some() {
        mention.phone = phone;
        changed = true;
    }
    if !person.tags.is_empty() && mention.tags != person.tags {
        mention.tags = person.tags.clone();
        changed = true;
    }
    if changed {
        mention.updated_at = Utc::now();
    }
    changed
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
