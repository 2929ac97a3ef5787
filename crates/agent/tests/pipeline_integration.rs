//! Integration tests for the message pipeline (classify -> extract -> resolve -> merge)
//!
//! Every test drives `MessagePipeline::handle` end to end against the
//! in-memory stores with a scripted model.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use contact_agent_agent::testing::{RecordingMessenger, ScriptedInference};
use contact_agent_agent::{
    replies, ContactResolver, ConversationFlow, ConversationFlowConfig, EntityExtractor,
    InboundMessage, Intent, IntentClassifier, IntentClassifierConfig, MergeEngine,
    MessagePipeline, ReplyKind,
};
use contact_agent_config::{FlowMode, ResolverConfig};
use contact_agent_core::{
    Contact, ContactStore, Error, NewUser, Result, User, UserStore,
};
use contact_agent_persistence::{
    InMemoryContactStore, InMemoryRegistrationFlowStore, InMemoryUserStore,
};
use contact_agent_text_processing::{NameNormalizer, PhoneNormalizer};

const PHONE: &str = "5521987654321";

struct Harness {
    contacts: Arc<InMemoryContactStore>,
    users: Arc<dyn UserStore>,
    inference: Arc<ScriptedInference>,
    messenger: Arc<RecordingMessenger>,
    pipeline: MessagePipeline,
}

fn harness_with_users(users: Arc<dyn UserStore>) -> Harness {
    let contacts = Arc::new(InMemoryContactStore::new());
    let flows = Arc::new(InMemoryRegistrationFlowStore::new());
    let inference = Arc::new(ScriptedInference::new());
    let messenger = Arc::new(RecordingMessenger::new());
    let phones = PhoneNormalizer::default();

    let extractor = Arc::new(EntityExtractor::new(
        inference.clone(),
        phones.clone(),
        Duration::from_secs(5),
    ));
    let classifier = IntentClassifier::new(inference.clone(), IntentClassifierConfig::default());
    let resolver = ContactResolver::new(
        contacts.clone(),
        users.clone(),
        NameNormalizer::default(),
        phones.clone(),
        ResolverConfig::default(),
    );
    let merge = MergeEngine::new(contacts.clone(), phones.clone());
    let flow = Arc::new(ConversationFlow::new(
        flows,
        users.clone(),
        messenger.clone(),
        extractor.clone(),
        phones.clone(),
        ConversationFlowConfig {
            mode: FlowMode::Conversational,
            ..Default::default()
        },
    ));

    let pipeline = MessagePipeline::new(
        users.clone(),
        classifier,
        extractor,
        resolver,
        merge,
        flow,
        messenger.clone(),
        phones,
    );

    Harness {
        contacts,
        users,
        inference,
        messenger,
        pipeline,
    }
}

fn harness() -> Harness {
    harness_with_users(Arc::new(InMemoryUserStore::new()))
}

async fn register_owner(h: &Harness) -> User {
    h.users
        .create(NewUser {
            name: "Carla Dias".to_string(),
            email: "carla@exemplo.com".to_string(),
            phone: PHONE.to_string(),
            temporary_password: "abc123XYZ0".to_string(),
        })
        .await
        .unwrap()
}

/// Test that an unknown number is registered and then treated as a user
#[tokio::test]
async fn test_unknown_sender_registers() {
    let h = harness();
    h.inference.push(
        r#"{"name": "Carla Dias", "email": "carla@exemplo.com", "phone_confirmed": true, "reply": "ok"}"#,
    );

    let reply = h
        .pipeline
        .handle(&InboundMessage::new(
            "+55 21 98765-4321",
            "Oi! Sou a Carla Dias, carla@exemplo.com, esse número é meu",
        ))
        .await
        .unwrap();

    assert_eq!(reply.to, PHONE);
    assert_eq!(reply.kind, ReplyKind::Registration);
    assert!(reply.registration_completed);
    assert!(reply.intent.is_none());
    assert!(h.users.find_by_email("carla@exemplo.com").await.unwrap().is_some());
    // the flow sends its own reply; the pipeline doesn't send twice
    assert_eq!(h.messenger.sent().len(), 1);

    // the legacy 8-digit form of the same number is now a known user
    let reply = h
        .pipeline
        .handle(&InboundMessage::new("552187654321", "oi"))
        .await
        .unwrap();
    assert_eq!(reply.kind, ReplyKind::Help);
    assert_eq!(reply.intent, Some(Intent::Other));
}

/// Test that contact info creates the contact, its tags and mentioned people
#[tokio::test]
async fn test_contact_info_creates_contact_and_mentions() {
    let h = harness();
    let owner = register_owner(&h).await;

    h.inference.push("contact_info");
    h.inference.push(
        r#"{
            "primary": {"name": "Pedro Alves", "company": "Fintech X", "phone": "21 99876-5432", "tags": ["fintech"]},
            "mentioned": [
                {"name": "Paula Reis", "description": "sócia do Pedro, investidora em healthtech", "tags": ["investidora"]}
            ]
        }"#,
    );

    let reply = h
        .pipeline
        .handle(&InboundMessage::new(
            PHONE,
            "Conheci o Pedro Alves da Fintech X, 21 99876-5432. Ele me falou da Paula Reis, investidora",
        ))
        .await
        .unwrap();

    assert_eq!(reply.kind, ReplyKind::ContactSaved);
    assert_eq!(reply.intent, Some(Intent::ContactInfo));
    assert!(reply.message.starts_with("Contato salvo: Pedro Alves"));
    assert!(reply.message.contains("Também anotei 1 pessoa mencionada."));
    assert_eq!(h.messenger.last_to(PHONE).as_deref(), Some(reply.message.as_str()));

    let contacts = h.contacts.list_contacts(owner.id).await.unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].phone.as_deref(), Some("5521998765432"));
    assert_eq!(h.contacts.tags_for_contact(contacts[0].id).await.unwrap().len(), 1);
    let mentions = h.contacts.list_mentions(contacts[0].id).await.unwrap();
    assert_eq!(mentions.len(), 1);
    assert_eq!(mentions[0].name, "Paula Reis");
}

/// Test that a new person named in another contact's notes gets their own record
#[tokio::test]
async fn test_contact_info_named_in_other_notes_creates_contact() {
    let h = harness();
    let owner = register_owner(&h).await;
    let carlos = h
        .contacts
        .insert_contact(
            Contact::new(owner.id, "Carlos Lima").with_context("casado com a Ana Souza"),
        )
        .await
        .unwrap();

    h.inference.push("contact_info");
    h.inference.push(
        r#"{
            "primary": {"name": "Ana Souza", "company": "Acme", "position": "advogada", "phone": "21911112222"},
            "mentioned": []
        }"#,
    );

    let reply = h
        .pipeline
        .handle(&InboundMessage::new(PHONE, "Ana Souza, advogada na Acme, 21911112222"))
        .await
        .unwrap();
    assert_eq!(reply.kind, ReplyKind::ContactSaved);
    assert_eq!(h.contacts.contact_count(), 2);

    let stored = h.contacts.get_contact(owner.id, carlos.id).await.unwrap().unwrap();
    assert_eq!(stored.company, None);
    assert_eq!(stored.phone, None);
    assert_eq!(stored.position, None);

    let ana = h
        .contacts
        .list_contacts(owner.id)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.name == "Ana Souza")
        .unwrap();
    assert_eq!(ana.phone.as_deref(), Some("5521911112222"));
    assert_eq!(ana.company.as_deref(), Some("Acme"));
}

/// Test that an update merges into the matched contact without clobbering it
#[tokio::test]
async fn test_update_contact_merges() {
    let h = harness();
    let owner = register_owner(&h).await;
    let pedro = h
        .contacts
        .insert_contact(Contact::new(owner.id, "Pedro Alves").with_company("Fintech X"))
        .await
        .unwrap();

    h.inference.push("update_contact");
    h.inference
        .push(r#"{"name": "Pedro Alves", "company": "Outra SA", "position": "CFO"}"#);

    let reply = h
        .pipeline
        .handle(&InboundMessage::new(PHONE, "O Pedro Alves agora é CFO"))
        .await
        .unwrap();
    assert_eq!(reply.kind, ReplyKind::ContactUpdated);

    let stored = h.contacts.get_contact(owner.id, pedro.id).await.unwrap().unwrap();
    assert_eq!(stored.position.as_deref(), Some("CFO"));
    assert_eq!(stored.company.as_deref(), Some("Fintech X"));
}

/// Test that updating an unknown contact offers suggestions
#[tokio::test]
async fn test_update_unknown_contact_suggests() {
    let h = harness();
    let owner = register_owner(&h).await;
    h.contacts
        .insert_contact(Contact::new(owner.id, "Marina"))
        .await
        .unwrap();

    h.inference.push("update_contact");
    h.inference.push(r#"{"name": "Mariela", "position": "Diretora"}"#);

    let reply = h
        .pipeline
        .handle(&InboundMessage::new(PHONE, "A Mariela virou diretora"))
        .await
        .unwrap();
    assert_eq!(reply.kind, ReplyKind::NotFound);
    assert!(reply.message.contains("Você quis dizer: Marina?"));
    assert_eq!(h.contacts.list_contacts(owner.id).await.unwrap().len(), 1);
}

/// Test that queries answer directly and through a mentioned connection
#[tokio::test]
async fn test_query_answers_direct_and_bridge() {
    let h = harness();
    let owner = register_owner(&h).await;
    let pedro = h
        .contacts
        .insert_contact(Contact::new(owner.id, "Pedro Alves").with_company("Fintech X"))
        .await
        .unwrap();
    let mut paula = contact_agent_core::MentionedConnection::new(pedro.id, "Paula Reis");
    paula.description = Some("investidora em healthtech".to_string());
    h.contacts.insert_mention(paula).await.unwrap();

    h.inference.push("query");
    h.inference.push(r#"{"name": "Pedro Alves"}"#);
    let reply = h
        .pipeline
        .handle(&InboundMessage::new(PHONE, "Qual o contato do Pedro Alves?"))
        .await
        .unwrap();
    assert_eq!(reply.kind, ReplyKind::QueryResult);
    assert!(reply.message.starts_with("Encontrei: Pedro Alves"));

    h.inference.push("query");
    h.inference.push(r#"{"name": "Paula Reis"}"#);
    let reply = h
        .pipeline
        .handle(&InboundMessage::new(PHONE, "Quem é a Paula Reis?"))
        .await
        .unwrap();
    assert_eq!(reply.kind, ReplyKind::QueryResult);
    assert!(reply.message.contains("mencionado(a) por Pedro Alves"));
    assert!(reply.message.contains("Peça uma apresentação a Pedro."));

    // bridges are answered, never saved as contacts
    assert_eq!(h.contacts.contact_count(), 1);
}

/// Test that greetings get the help text without calling the model
#[tokio::test]
async fn test_greeting_short_circuits() {
    let h = harness();
    register_owner(&h).await;

    let reply = h
        .pipeline
        .handle(&InboundMessage::new(PHONE, "Bom dia!"))
        .await
        .unwrap();
    assert_eq!(reply.kind, ReplyKind::Help);
    assert_eq!(reply.message, replies::HELP);
    assert_eq!(h.inference.call_count(), 0);
}

/// Test that a register intent asks for the contact's details
#[tokio::test]
async fn test_register_intent_asks_for_details() {
    let h = harness();
    register_owner(&h).await;
    h.inference.push("register_intent");

    let reply = h
        .pipeline
        .handle(&InboundMessage::new(PHONE, "Quero cadastrar um contato novo"))
        .await
        .unwrap();
    assert_eq!(reply.kind, ReplyKind::AskDetails);
    assert_eq!(reply.message, replies::ASK_CONTACT_DETAILS);
}

/// Test that unusable extraction output gets a retry prompt
#[tokio::test]
async fn test_extraction_failure_replies() {
    let h = harness();
    let owner = register_owner(&h).await;
    h.inference.push("contact_info");
    h.inference.push("desculpe, não entendi");

    let reply = h
        .pipeline
        .handle(&InboundMessage::new(PHONE, "anota esse contato aí pra mim"))
        .await
        .unwrap();
    assert_eq!(reply.kind, ReplyKind::ExtractionFailed);
    assert_eq!(reply.message, replies::EXTRACTION_FAILED);
    assert!(h.contacts.list_contacts(owner.id).await.unwrap().is_empty());
}

struct BrokenUserStore;

#[async_trait]
impl UserStore for BrokenUserStore {
    async fn find_by_email(&self, _email: &str) -> Result<Option<User>> {
        Err(Error::Storage("connection reset".to_string()))
    }

    async fn find_by_phone(&self, _variants: &[String]) -> Result<Option<User>> {
        Err(Error::Storage("connection reset".to_string()))
    }

    async fn get(&self, _user_id: Uuid) -> Result<Option<User>> {
        Err(Error::Storage("connection reset".to_string()))
    }

    async fn create(&self, _new_user: NewUser) -> Result<User> {
        Err(Error::Storage("connection reset".to_string()))
    }
}

/// Test that storage failures still answer the sender
#[tokio::test]
async fn test_storage_failure_sends_apology() {
    let h = harness_with_users(Arc::new(BrokenUserStore));

    let result = h
        .pipeline
        .handle(&InboundMessage::new(PHONE, "Conheci a Ana Souza da Acme"))
        .await;

    assert!(result.is_err());
    assert_eq!(h.messenger.last_to(PHONE).as_deref(), Some(replies::APOLOGY));
    assert_eq!(h.inference.call_count(), 0);
}
