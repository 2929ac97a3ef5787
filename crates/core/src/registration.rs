//! Registration flow state
//!
//! Per-phone conversation state for onboarding an unknown number. The record
//! shape is what `RegistrationFlowStore` implementations persist.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Registration steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStep {
    /// Free-form conversation (initial state of the conversational mode)
    #[default]
    Conversation,
    AwaitingName,
    AwaitingPhoneConfirmation,
    AwaitingEmail,
    /// Terminal: a user was created
    Completed,
    /// Terminal: expired without completing
    Abandoned,
}

impl RegistrationStep {
    /// Check if the flow can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(self, RegistrationStep::Completed | RegistrationStep::Abandoned)
    }

    /// Only terminal steps are final
    pub fn can_transition_to(&self, _target: RegistrationStep) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStep::Conversation => "conversation",
            RegistrationStep::AwaitingName => "awaiting_name",
            RegistrationStep::AwaitingPhoneConfirmation => "awaiting_phone_confirmation",
            RegistrationStep::AwaitingEmail => "awaiting_email",
            RegistrationStep::Completed => "completed",
            RegistrationStep::Abandoned => "abandoned",
        }
    }
}

/// Who wrote a history message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

impl std::fmt::Display for HistoryRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryRole::User => write!(f, "user"),
            HistoryRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in the registration conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: HistoryRole,
    pub content: String,
}

impl HistoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Assistant,
            content: content.into(),
        }
    }
}

/// Fields gathered so far
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_confirmed: bool,
}

impl CollectedFields {
    pub fn has_name(&self) -> bool {
        self.name.as_deref().map(|n| !n.trim().is_empty()).unwrap_or(false)
    }

    pub fn has_email(&self) -> bool {
        self.email.as_deref().map(|e| !e.trim().is_empty()).unwrap_or(false)
    }
}

/// Per-phone registration conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationFlow {
    /// Canonical phone of the sender; the flow's key
    pub phone: String,
    pub step: RegistrationStep,
    #[serde(rename = "conversationHistory")]
    pub history: Vec<HistoryMessage>,
    #[serde(rename = "extractedData")]
    pub collected: CollectedFields,
    pub attempts_count: u32,
    pub last_message_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RegistrationFlow {
    /// Start a new flow at `step`, expiring `ttl` after `now`
    pub fn start(
        phone: impl Into<String>,
        step: RegistrationStep,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            phone: phone.into(),
            step,
            history: Vec::new(),
            collected: CollectedFields::default(),
            attempts_count: 0,
            last_message_at: now,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Non-terminal and not yet expired
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.step.is_terminal() && !self.is_expired(now)
    }

    /// Record an inbound message: append, count the attempt, push expiry out
    pub fn record_inbound(&mut self, text: &str, now: DateTime<Utc>, ttl: Duration) {
        self.history.push(HistoryMessage::user(text));
        self.attempts_count = self.attempts_count.saturating_add(1);
        self.last_message_at = now;
        self.expires_at = now + ttl;
    }

    pub fn record_reply(&mut self, text: &str) {
        self.history.push(HistoryMessage::assistant(text));
    }

    /// Move to `target`; invalid transitions are ignored and logged
    pub fn transition_to(&mut self, target: RegistrationStep) -> bool {
        if !self.step.can_transition_to(target) {
            tracing::warn!(
                phone = %self.phone,
                from = ?self.step,
                to = ?target,
                "Ignoring invalid registration transition"
            );
            return false;
        }
        self.step = target;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_steps_do_not_transition() {
        assert!(RegistrationStep::Completed.is_terminal());
        assert!(RegistrationStep::Abandoned.is_terminal());
        assert!(!RegistrationStep::Completed.can_transition_to(RegistrationStep::AwaitingName));
        assert!(RegistrationStep::AwaitingName.can_transition_to(RegistrationStep::AwaitingEmail));
        assert!(RegistrationStep::AwaitingEmail.can_transition_to(RegistrationStep::AwaitingName));
    }

    #[test]
    fn test_completed_flow_ignores_transitions() {
        let mut flow = RegistrationFlow::start(
            "5521987654321",
            RegistrationStep::AwaitingEmail,
            Utc::now(),
            Duration::hours(24),
        );
        assert!(flow.transition_to(RegistrationStep::Completed));
        assert!(!flow.transition_to(RegistrationStep::Abandoned));
        assert_eq!(flow.step, RegistrationStep::Completed);
    }

    #[test]
    fn test_record_inbound_extends_expiry() {
        let start = Utc::now() - Duration::hours(2);
        let mut flow = RegistrationFlow::start(
            "5521987654321",
            RegistrationStep::Conversation,
            start,
            Duration::hours(24),
        );
        let now = Utc::now();
        flow.record_inbound("oi", now, Duration::hours(24));

        assert_eq!(flow.attempts_count, 1);
        assert_eq!(flow.history.len(), 1);
        assert_eq!(flow.expires_at, now + Duration::hours(24));
        assert!(flow.is_active(now));
    }

    #[test]
    fn test_expired_flow_is_not_active() {
        let now = Utc::now();
        let flow = RegistrationFlow::start(
            "5521987654321",
            RegistrationStep::AwaitingName,
            now - Duration::hours(25),
            Duration::hours(24),
        );
        assert!(flow.is_expired(now));
        assert!(!flow.is_active(now));
    }

    #[test]
    fn test_serialized_shape() {
        let now = Utc::now();
        let mut flow =
            RegistrationFlow::start("5521987654321", RegistrationStep::AwaitingEmail, now, Duration::hours(1));
        flow.collected.phone_confirmed = true;
        let json = serde_json::to_value(&flow).unwrap();

        assert_eq!(json["step"], "awaiting_email");
        assert_eq!(json["extractedData"]["phoneConfirmed"], true);
        assert!(json["conversationHistory"].is_array());
        assert!(json.get("attemptsCount").is_some());

        let back: RegistrationFlow = serde_json::from_value(json).unwrap();
        assert_eq!(back, flow);
    }
}
