//! Registration conversation for unknown phone numbers
//!
//! ```text
//! Conversation / AwaitingName
//!        │  name, phone confirmation and email collected in any order
//!        ▼
//! AwaitingPhoneConfirmation ─► AwaitingEmail ─► Completed (user created)
//!
//! any non-terminal step ── expiry sweep ──► Abandoned
//! ```
//!
//! Turns for one phone are serialized by a keyed lock: read the flow, mutate
//! it, save it, then send the reply.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::watch;

use contact_agent_config::{FlowConfig, FlowMode};
use contact_agent_core::{
    HistoryMessage, MessagingClient, NewUser, RegistrationFlow, RegistrationFlowStore,
    RegistrationStep, User, UserStore,
};
use contact_agent_text_processing::{fold, PhoneNormalizer};

use crate::extraction::{
    find_email, parse_yes_no, EntityExtractor, RegistrationExtraction, MIN_NAME_CHARS,
};
use crate::intent::DEFAULT_GREETINGS;
use crate::locks::KeyedLocks;
use crate::replies;
use crate::AgentError;

/// Length of the generated temporary password
pub const TEMPORARY_PASSWORD_LEN: usize = 10;

/// Lead-ins stripped from a typed name ("meu nome é Carla" → "Carla")
const NAME_PREFIXES: &[&str] = &[
    "meu nome e",
    "meu nome",
    "me chamo",
    "eu me chamo",
    "eu sou o",
    "eu sou a",
    "eu sou",
    "sou o",
    "sou a",
    "sou",
    "aqui e o",
    "aqui e a",
    "aqui e",
    "nome",
    "my name is",
    "i am",
];

#[derive(Debug, Clone)]
pub struct ConversationFlowConfig {
    pub mode: FlowMode,
    /// Inactivity window; every inbound message pushes expiry this far out
    pub ttl: Duration,
    /// Attempts before asking the name directly (N1)
    pub name_fallback_attempts: u32,
    /// Further attempts before asking the email directly (N2)
    pub email_fallback_attempts: u32,
    /// History messages sent to inference per turn
    pub history_window: usize,
}

impl Default for ConversationFlowConfig {
    fn default() -> Self {
        Self::from(&FlowConfig::default())
    }
}

impl From<&FlowConfig> for ConversationFlowConfig {
    fn from(config: &FlowConfig) -> Self {
        Self {
            mode: config.mode,
            ttl: Duration::hours(config.ttl_hours as i64),
            name_fallback_attempts: config.name_fallback_attempts,
            email_fallback_attempts: config.email_fallback_attempts,
            history_window: config.history_window,
        }
    }
}

impl ConversationFlowConfig {
    fn phone_fallback_after(&self) -> u32 {
        self.name_fallback_attempts + 2
    }

    fn email_fallback_after(&self) -> u32 {
        self.name_fallback_attempts + self.email_fallback_attempts + 2
    }
}

/// What one inbound message produced
#[derive(Debug, Clone, PartialEq)]
pub struct FlowReply {
    /// Canonical phone of the flow
    pub phone: String,
    pub step: RegistrationStep,
    /// Text sent back to the user
    pub message: String,
    /// Set on the turn that created the user
    pub completed_user: Option<User>,
}

struct Turn {
    message: String,
    completed_user: Option<User>,
}

impl Turn {
    fn reply(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            completed_user: None,
        }
    }
}

pub struct ConversationFlow {
    flows: Arc<dyn RegistrationFlowStore>,
    users: Arc<dyn UserStore>,
    messenger: Arc<dyn MessagingClient>,
    extractor: Arc<EntityExtractor>,
    phones: PhoneNormalizer,
    config: ConversationFlowConfig,
    locks: KeyedLocks,
}

impl ConversationFlow {
    pub fn new(
        flows: Arc<dyn RegistrationFlowStore>,
        users: Arc<dyn UserStore>,
        messenger: Arc<dyn MessagingClient>,
        extractor: Arc<EntityExtractor>,
        phones: PhoneNormalizer,
        config: ConversationFlowConfig,
    ) -> Self {
        Self {
            flows,
            users,
            messenger,
            extractor,
            phones,
            config,
            locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &ConversationFlowConfig {
        &self.config
    }

    /// Process one message from an unregistered number and send the reply
    pub async fn handle_message(&self, phone: &str, text: &str) -> Result<FlowReply, AgentError> {
        let phone = self.canonical_phone(phone)?;
        let _guard = self.locks.lock(&phone).await;
        let now = Utc::now();

        let mut flow = match self.flows.get(&phone).await? {
            Some(flow) if flow.is_active(now) => flow,
            previous => {
                if let Some(previous) = previous {
                    tracing::debug!(phone = %phone, step = ?previous.step, "Previous flow inactive, starting over");
                }
                let step = match self.config.mode {
                    FlowMode::Conversational => RegistrationStep::Conversation,
                    FlowMode::Rigid => RegistrationStep::AwaitingName,
                };
                tracing::info!(phone = %phone, mode = ?self.config.mode, "Registration flow started");
                RegistrationFlow::start(phone.clone(), step, now, self.config.ttl)
            },
        };

        let first_turn = flow.history.is_empty();
        flow.record_inbound(text, now, self.config.ttl);

        let turn = match self.config.mode {
            FlowMode::Conversational => self.conversational_turn(&mut flow, text).await?,
            FlowMode::Rigid => self.rigid_turn(&mut flow, text, first_turn).await?,
        };

        flow.record_reply(&turn.message);
        self.flows.save(&flow).await?;

        if let Err(e) = self.messenger.send_text(&phone, &turn.message).await {
            tracing::warn!(phone = %phone, error = %e, "Failed to send registration reply");
        }

        tracing::debug!(
            phone = %phone,
            step = flow.step.as_str(),
            attempts = flow.attempts_count,
            "Registration turn done"
        );

        Ok(FlowReply {
            phone,
            step: flow.step,
            message: turn.message,
            completed_user: turn.completed_user,
        })
    }

    /// The flow for `phone` if it is neither terminal nor expired
    pub async fn get_active_flow(
        &self,
        phone: &str,
    ) -> Result<Option<RegistrationFlow>, AgentError> {
        let phone = self.canonical_phone(phone)?;
        let now = Utc::now();
        Ok(self.flows.get(&phone).await?.filter(|f| f.is_active(now)))
    }

    /// Mark every expired, non-terminal flow as abandoned
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, AgentError> {
        let candidates = self.flows.list_open().await?;
        let mut abandoned = 0;

        for candidate in candidates.into_iter().filter(|f| f.is_expired(now)) {
            let _guard = self.locks.lock(&candidate.phone).await;
            // a message may have arrived since the listing
            let mut flow = match self.flows.get(&candidate.phone).await? {
                Some(flow) if !flow.step.is_terminal() && flow.is_expired(now) => flow,
                _ => continue,
            };
            if flow.transition_to(RegistrationStep::Abandoned) {
                self.flows.save(&flow).await?;
                abandoned += 1;
                tracing::info!(phone = %flow.phone, attempts = flow.attempts_count, "Registration flow abandoned");
            }
        }

        self.locks.prune();
        Ok(abandoned)
    }

    /// Run [`ConversationFlow::sweep_expired`] periodically until the
    /// returned sender publishes `true`
    pub fn spawn_expiry_sweeper(self: &Arc<Self>, interval: std::time::Duration) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let flow = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        match flow.sweep_expired(Utc::now()).await {
                            Ok(0) => {},
                            Ok(count) => tracing::info!("Registration sweep: abandoned {} expired flows", count),
                            Err(e) => tracing::warn!(error = %e, "Registration sweep failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Registration sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    fn canonical_phone(&self, raw: &str) -> Result<String, AgentError> {
        if let Some(canonical) = self.phones.normalize(raw) {
            return Ok(canonical);
        }
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(AgentError::InvalidInput(format!("no phone digits in {:?}", raw)));
        }
        tracing::debug!(phone = %digits, "Phone does not normalize, keying flow by digits");
        Ok(digits)
    }

    async fn conversational_turn(
        &self,
        flow: &mut RegistrationFlow,
        text: &str,
    ) -> Result<Turn, AgentError> {
        // a direct question was asked last turn: try the deterministic parse first
        self.apply_direct_answer(flow, text);

        let window = history_window(&flow.history, self.config.history_window);
        let model_reply = match self
            .extractor
            .extract_registration(&flow.phone, &flow.collected, window)
            .await
        {
            RegistrationExtraction::Success(turn) => {
                if !flow.collected.has_name() {
                    flow.collected.name = turn.name;
                }
                if !flow.collected.has_email() {
                    flow.collected.email = turn.email;
                }
                if turn.phone_confirmed == Some(true) {
                    flow.collected.phone_confirmed = true;
                }
                turn.reply
            },
            RegistrationExtraction::Failure { reason, .. } => {
                tracing::info!(phone = %flow.phone, reason = %reason, "Registration extraction failed");
                None
            },
        };

        if is_complete(flow) {
            return self.complete(flow).await;
        }

        let attempts = flow.attempts_count;
        let collected = &flow.collected;
        if !collected.has_name() && attempts >= self.config.name_fallback_attempts {
            flow.transition_to(RegistrationStep::AwaitingName);
            return Ok(Turn::reply(replies::ASK_NAME));
        }
        if !collected.phone_confirmed && attempts >= self.config.phone_fallback_after() {
            flow.transition_to(RegistrationStep::AwaitingPhoneConfirmation);
            return Ok(Turn::reply(self.ask_phone(flow)));
        }
        if !collected.has_email() && attempts >= self.config.email_fallback_after() {
            flow.transition_to(RegistrationStep::AwaitingEmail);
            return Ok(Turn::reply(replies::ASK_EMAIL));
        }

        flow.transition_to(RegistrationStep::Conversation);
        Ok(Turn::reply(
            model_reply.unwrap_or_else(|| self.next_question(flow)),
        ))
    }

    async fn rigid_turn(
        &self,
        flow: &mut RegistrationFlow,
        text: &str,
        first_turn: bool,
    ) -> Result<Turn, AgentError> {
        if first_turn {
            flow.transition_to(RegistrationStep::AwaitingName);
            return Ok(Turn::reply(replies::WELCOME));
        }

        match flow.step {
            RegistrationStep::AwaitingName => match parse_name(text) {
                Some(name) => {
                    flow.collected.name = Some(name);
                    flow.transition_to(RegistrationStep::AwaitingPhoneConfirmation);
                    Ok(Turn::reply(self.ask_phone(flow)))
                },
                None => Ok(Turn::reply(replies::ASK_NAME)),
            },
            RegistrationStep::AwaitingPhoneConfirmation => match self.phone_answer(flow, text) {
                Some(true) => {
                    flow.collected.phone_confirmed = true;
                    flow.transition_to(RegistrationStep::AwaitingEmail);
                    let name = flow.collected.name.clone().unwrap_or_default();
                    Ok(Turn::reply(replies::ask_email_for(&name)))
                },
                Some(false) => Ok(Turn::reply(replies::PHONE_DECLINED)),
                None => Ok(Turn::reply(self.ask_phone(flow))),
            },
            RegistrationStep::AwaitingEmail => match find_email(text) {
                Some(email) => {
                    flow.collected.email = Some(email);
                    if is_complete(flow) {
                        self.complete(flow).await
                    } else {
                        flow.transition_to(RegistrationStep::Conversation);
                        Ok(Turn::reply(self.next_question(flow)))
                    }
                },
                None => Ok(Turn::reply(replies::INVALID_EMAIL)),
            },
            // Conversation only happens after a mode switch; restart at the first gap
            _ => {
                let question = self.next_question(flow);
                Ok(Turn::reply(question))
            },
        }
    }

    /// Parse the answer to a directly asked question, if any
    fn apply_direct_answer(&self, flow: &mut RegistrationFlow, text: &str) {
        match flow.step {
            RegistrationStep::AwaitingName if !flow.collected.has_name() => {
                flow.collected.name = parse_name(text);
            },
            RegistrationStep::AwaitingPhoneConfirmation if !flow.collected.phone_confirmed => {
                if self.phone_answer(flow, text) == Some(true) {
                    flow.collected.phone_confirmed = true;
                }
            },
            RegistrationStep::AwaitingEmail if !flow.collected.has_email() => {
                flow.collected.email = find_email(text);
            },
            _ => {},
        }
    }

    /// Yes/no, or the same number typed back
    fn phone_answer(&self, flow: &RegistrationFlow, text: &str) -> Option<bool> {
        let typed = self.phones.find_in_text(text);
        if typed.iter().any(|p| self.phones.same_number(p, &flow.phone)) {
            return Some(true);
        }
        parse_yes_no(text)
    }

    fn ask_phone(&self, flow: &RegistrationFlow) -> String {
        replies::ask_phone_confirmation(&self.phones.format_display(&flow.phone))
    }

    /// Template question for the first missing field; moves the step to match
    fn next_question(&self, flow: &mut RegistrationFlow) -> String {
        if !flow.collected.has_name() {
            flow.transition_to(RegistrationStep::AwaitingName);
            replies::ASK_NAME.to_string()
        } else if !flow.collected.phone_confirmed {
            flow.transition_to(RegistrationStep::AwaitingPhoneConfirmation);
            self.ask_phone(flow)
        } else {
            flow.transition_to(RegistrationStep::AwaitingEmail);
            replies::ASK_EMAIL.to_string()
        }
    }

    /// Create the user, or clear a taken email and ask again
    async fn complete(&self, flow: &mut RegistrationFlow) -> Result<Turn, AgentError> {
        let name = flow.collected.name.clone().unwrap_or_default();
        let email = flow.collected.email.clone().unwrap_or_default();

        if self.users.find_by_email(&email).await?.is_some() {
            return Ok(self.email_conflict(flow));
        }

        let temporary_password = generate_password();
        let new_user = NewUser {
            name: name.clone(),
            email: email.clone(),
            phone: flow.phone.clone(),
            temporary_password: temporary_password.clone(),
        };

        match self.users.create(new_user).await {
            Ok(user) => {
                flow.transition_to(RegistrationStep::Completed);
                tracing::info!(
                    phone = %flow.phone,
                    user_id = %user.id,
                    attempts = flow.attempts_count,
                    "Registration completed"
                );
                Ok(Turn {
                    message: replies::registration_completed(&name, &email, &temporary_password),
                    completed_user: Some(user),
                })
            },
            Err(contact_agent_core::Error::Conflict(_)) => Ok(self.email_conflict(flow)),
            Err(e) => Err(e.into()),
        }
    }

    fn email_conflict(&self, flow: &mut RegistrationFlow) -> Turn {
        tracing::info!(phone = %flow.phone, "Registration email already in use");
        flow.collected.email = None;
        flow.transition_to(RegistrationStep::AwaitingEmail);
        Turn::reply(replies::EMAIL_CONFLICT)
    }
}

fn is_complete(flow: &RegistrationFlow) -> bool {
    flow.collected.has_name()
        && flow.collected.phone_confirmed
        && flow
            .collected
            .email
            .as_deref()
            .map(crate::extraction::is_valid_email)
            .unwrap_or(false)
}

fn history_window(history: &[HistoryMessage], window: usize) -> &[HistoryMessage] {
    let start = history.len().saturating_sub(window);
    &history[start..]
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TEMPORARY_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// A name typed in answer to "what's your name?"
pub fn parse_name(text: &str) -> Option<String> {
    let trimmed = text
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string();
    if trimmed.is_empty() || trimmed.contains('@') || trimmed.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    // strip a lead-in by word count so the original casing and accents survive
    let folded = fold(&trimmed);
    let skip_words = NAME_PREFIXES
        .iter()
        .find(|prefix| {
            folded == **prefix
                || folded
                    .strip_prefix(**prefix)
                    .map(|rest| rest.starts_with(' '))
                    .unwrap_or(false)
        })
        .map(|prefix| prefix.split_whitespace().count())
        .unwrap_or(0);

    let name = trimmed
        .split_whitespace()
        .skip(skip_words)
        .collect::<Vec<_>>()
        .join(" ");
    let name = name.trim_matches(|c: char| !c.is_alphanumeric()).to_string();

    if name.chars().count() < MIN_NAME_CHARS || name.split_whitespace().count() > 6 {
        return None;
    }
    if DEFAULT_GREETINGS.contains(&fold(&name).as_str()) {
        return None;
    }
    Some(name)
}
