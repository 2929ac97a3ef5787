//! Inbound message pipeline
//!
//! ```text
//! message ─► sender known? ──no──► ConversationFlow (registration)
//!                 │yes
//!                 ▼
//!          IntentClassifier
//!    ┌────────┬───────┴────────┬─────────────────┬───────┐
//! contact_info  update_contact   query       register_intent other
//!    │            │               │                 │         │
//! extract+mentions extract      extract term      ask       help
//!    │            │               │
//! resolve ─► merge  resolve ─► merge_into  resolve ─► answer
//! ```
//!
//! Every path ends with a reply to the sender; internal errors send an
//! apology and are then returned to the caller.

use std::sync::Arc;

use serde::Serialize;

use contact_agent_core::{MessagingClient, User, UserStore};
use contact_agent_text_processing::PhoneNormalizer;

use crate::extraction::{ConnectionsExtraction, EntityExtractor, ExtractionResult};
use crate::intent::{Intent, IntentClassifier};
use crate::merge::{MergeEngine, MergeReport, UpsertOutcome};
use crate::registration::ConversationFlow;
use crate::replies;
use crate::resolver::{ContactResolver, Resolution};
use crate::AgentError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender phone, any format
    pub from: String,
    pub text: String,
}

impl InboundMessage {
    pub fn new(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Registration,
    ContactSaved,
    ContactUpdated,
    ContactUnchanged,
    QueryResult,
    NotFound,
    AskDetails,
    ExtractionFailed,
    Help,
}

impl ReplyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyKind::Registration => "registration",
            ReplyKind::ContactSaved => "contact_saved",
            ReplyKind::ContactUpdated => "contact_updated",
            ReplyKind::ContactUnchanged => "contact_unchanged",
            ReplyKind::QueryResult => "query_result",
            ReplyKind::NotFound => "not_found",
            ReplyKind::AskDetails => "ask_details",
            ReplyKind::ExtractionFailed => "extraction_failed",
            ReplyKind::Help => "help",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReply {
    pub to: String,
    pub message: String,
    pub kind: ReplyKind,
    pub intent: Option<Intent>,
    pub registration_completed: bool,
}

pub struct MessagePipeline {
    users: Arc<dyn UserStore>,
    classifier: IntentClassifier,
    extractor: Arc<EntityExtractor>,
    resolver: ContactResolver,
    merge: MergeEngine,
    flow: Arc<ConversationFlow>,
    messenger: Arc<dyn MessagingClient>,
    phones: PhoneNormalizer,
}

impl MessagePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserStore>,
        classifier: IntentClassifier,
        extractor: Arc<EntityExtractor>,
        resolver: ContactResolver,
        merge: MergeEngine,
        flow: Arc<ConversationFlow>,
        messenger: Arc<dyn MessagingClient>,
        phones: PhoneNormalizer,
    ) -> Self {
        Self {
            users,
            classifier,
            extractor,
            resolver,
            merge,
            flow,
            messenger,
            phones,
        }
    }

    pub fn resolver(&self) -> &ContactResolver {
        &self.resolver
    }

    pub fn flow(&self) -> &Arc<ConversationFlow> {
        &self.flow
    }

    pub async fn handle(&self, message: &InboundMessage) -> Result<PipelineReply, AgentError> {
        let to = self
            .phones
            .normalize(&message.from)
            .unwrap_or_else(|| message.from.chars().filter(|c| c.is_ascii_digit()).collect());
        if to.is_empty() {
            return Err(AgentError::InvalidInput(format!(
                "sender {:?} has no phone digits",
                message.from
            )));
        }

        let variants = self.phones.variants(&to);
        let sender = if variants.is_empty() {
            None
        } else {
            match self.users.find_by_phone(&variants).await {
                Ok(sender) => sender,
                Err(e) => {
                    self.apologize(&to).await;
                    return Err(e.into());
                },
            }
        };

        let user = match sender {
            Some(user) => user,
            None => {
                // the flow sends its own replies
                return match self.flow.handle_message(&to, &message.text).await {
                    Ok(reply) => Ok(PipelineReply {
                        to,
                        message: reply.message,
                        kind: ReplyKind::Registration,
                        intent: None,
                        registration_completed: reply.completed_user.is_some(),
                    }),
                    Err(e) => {
                        tracing::error!(phone = %to, error = %e, "Registration turn failed");
                        self.apologize(&to).await;
                        Err(e)
                    },
                };
            },
        };

        match self.handle_known(&user, &message.text).await {
            Ok((intent, kind, text)) => {
                if let Err(e) = self.messenger.send_text(&to, &text).await {
                    tracing::warn!(phone = %to, error = %e, "Failed to send reply");
                }
                Ok(PipelineReply {
                    to,
                    message: text,
                    kind,
                    intent: Some(intent),
                    registration_completed: false,
                })
            },
            Err(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Message handling failed");
                self.apologize(&to).await;
                Err(e)
            },
        }
    }

    async fn handle_known(
        &self,
        user: &User,
        text: &str,
    ) -> Result<(Intent, ReplyKind, String), AgentError> {
        let intent = self.classifier.classify(text).await;
        tracing::info!(user_id = %user.id, intent = %intent, "Message classified");

        let (kind, reply) = match intent {
            Intent::ContactInfo => self.save_contact(user, text).await?,
            Intent::UpdateContact => self.update_contact(user, text).await?,
            Intent::Query => self.answer_query(user, text).await?,
            Intent::RegisterIntent => (ReplyKind::AskDetails, replies::ASK_CONTACT_DETAILS.to_string()),
            Intent::Other => (ReplyKind::Help, replies::HELP.to_string()),
        };
        Ok((intent, kind, reply))
    }

    async fn save_contact(&self, user: &User, text: &str) -> Result<(ReplyKind, String), AgentError> {
        let (primary, mentioned) = match self.extractor.extract_with_connections(text).await {
            ConnectionsExtraction::Success { primary, mentioned } => (primary, mentioned),
            ConnectionsExtraction::Failure { reason, .. } => {
                tracing::info!(user_id = %user.id, reason = %reason, "Nothing to save");
                return Ok(extraction_failed());
            },
        };

        let resolution = self.resolver.resolve(user.id, &primary).await?;
        let report = self
            .merge
            .apply_with_mentions(user.id, &resolution, &primary, &mentioned)
            .await?;
        log_report(user, &resolution, &report);

        let (kind, mut reply) = outcome_reply(&report.outcome);
        let mentions = replies::mentions_saved(report.mentions.total());
        if !mentions.is_empty() && report.outcome.contact().is_some() {
            reply.push('\n');
            reply.push_str(&mentions);
        }
        Ok((kind, reply))
    }

    async fn update_contact(
        &self,
        user: &User,
        text: &str,
    ) -> Result<(ReplyKind, String), AgentError> {
        let data = match self.extractor.extract(text).await {
            ExtractionResult::Success(data) => data,
            ExtractionResult::Failure { reason, .. } => {
                tracing::info!(user_id = %user.id, reason = %reason, "Nothing to update");
                return Ok(extraction_failed());
            },
        };
        let term = data.search_term().unwrap_or_default().to_string();

        match self.resolver.resolve(user.id, &data).await? {
            Resolution::Direct { contact, .. } => {
                let report = self.merge.merge_into(&contact, &data).await?;
                Ok(outcome_reply(&report.outcome))
            },
            // mentioned connections are never promoted to contacts
            Resolution::Bridge { .. } => Ok((ReplyKind::NotFound, replies::not_found(&term, &[]))),
            Resolution::NoMatch { suggestions } => {
                Ok((ReplyKind::NotFound, replies::not_found(&term, &suggestions)))
            },
        }
    }

    async fn answer_query(&self, user: &User, text: &str) -> Result<(ReplyKind, String), AgentError> {
        let extracted = self.extractor.extract(text).await;
        let term = extracted
            .data()
            .and_then(|d| d.search_term())
            .unwrap_or(text)
            .to_string();

        match self.resolver.resolve_term(user.id, &term).await? {
            Resolution::Direct { contact, .. } => {
                Ok((ReplyKind::QueryResult, replies::query_found(&contact)))
            },
            Resolution::Bridge { connection, via } => {
                Ok((ReplyKind::QueryResult, replies::query_bridge(&connection, &via)))
            },
            Resolution::NoMatch { suggestions } => {
                Ok((ReplyKind::NotFound, replies::not_found(&term, &suggestions)))
            },
        }
    }

    async fn apologize(&self, to: &str) {
        if let Err(e) = self.messenger.send_text(to, replies::APOLOGY).await {
            tracing::warn!(phone = %to, error = %e, "Failed to send apology");
        }
    }
}

fn extraction_failed() -> (ReplyKind, String) {
    (ReplyKind::ExtractionFailed, replies::EXTRACTION_FAILED.to_string())
}

fn outcome_reply(outcome: &UpsertOutcome) -> (ReplyKind, String) {
    match outcome {
        UpsertOutcome::Created { contact } => (ReplyKind::ContactSaved, replies::contact_created(contact)),
        UpsertOutcome::Updated { contact, .. } => {
            (ReplyKind::ContactUpdated, replies::contact_updated(contact))
        },
        UpsertOutcome::Unchanged { contact } => {
            (ReplyKind::ContactUnchanged, replies::contact_unchanged(contact))
        },
        UpsertOutcome::Skipped { .. } => extraction_failed(),
    }
}

fn log_report(user: &User, resolution: &Resolution, report: &MergeReport) {
    tracing::info!(
        user_id = %user.id,
        resolution = resolution.kind(),
        outcome = report.outcome.as_str(),
        tags_attached = report.tags_attached,
        mentions_created = report.mentions.created,
        mentions_updated = report.mentions.updated,
        partial_failures = report.partial_failures.len(),
        "Contact data merged"
    );
}
