//! Instruction prompts for the text-inference collaborator
//!
//! Inputs are Brazilian Portuguese chat messages (typed or transcribed
//! audio). Prompts are in English; the model is told to keep field values in
//! the language they were written in.

use contact_agent_core::{CollectedFields, HistoryMessage};

/// Intent classification; the model must answer with one label
pub const INTENT_PROMPT: &str = r#"You classify WhatsApp messages sent to a personal contact-network assistant.
Answer with exactly ONE of these labels and nothing else:

query           - the user wants to find or look someone up ("quem eu conheço que trabalha com marketing?", "qual o telefone do Pedro?")
contact_info    - the user is giving data about a person to save: a name plus any detail such as company, role, phone, email, city or how they met
update_contact  - the user wants to change or add something on a contact that already exists ("atualiza o email da Ana", "o Carlos mudou para a Acme")
register_intent - the user says they want to add a contact but gives no data yet ("quero cadastrar um contato")
other           - greetings, thanks, small talk, nonsense, or anything else

Edge cases:
- A lone first name with no other detail is "query".
- A name together with a company, role or phone is "contact_info".
- An explicit change verb (atualizar, mudar, corrigir, trocar, adicionar ao) about a known person is "update_contact".
- Random characters or unrelated chatter is "other"."#;

/// Single-contact extraction
pub const EXTRACTION_PROMPT: &str = r#"Extract contact data about the person described in the user's message.
Return ONLY a JSON object with these keys (use null when absent, never invent values):

{
  "name": string | null,         // the person's name, never a greeting such as "oi" or "bom dia"
  "company": string | null,
  "position": string | null,     // job title or role
  "phone": string | null,        // digits only; accept any Brazilian format, e.g. (21) 98765-4321, +55 21 8765-4321
  "email": string | null,
  "location": string | null,     // city / state / country
  "context": string | null,      // how the user knows this person, interests, anything else worth remembering
  "tags": [string],              // short topical labels such as "investidor", "marketing", "saude"
  "confidence": number           // 0.0 to 1.0, how sure you are this message describes a person
}

Keep values in the language they were written in. Do not add commentary."#;

/// Primary subject plus secondary people mentioned in the same text
pub const CONNECTIONS_PROMPT: &str = r#"The user is describing a contact. The message may also mention other people the contact knows.
Return ONLY a JSON object:

{
  "primary": {
    "name": string | null,
    "company": string | null,
    "position": string | null,
    "phone": string | null,      // digits only; accept any Brazilian format
    "email": string | null,
    "location": string | null,
    "context": string | null,
    "tags": [string],
    "confidence": number         // 0.0 to 1.0
  },
  "mentioned": [
    {
      "name": string,            // a secondary person named in the message
      "description": string | null, // who they are / how they relate to the primary contact
      "tags": [string],
      "phone": string | null
    }
  ]
}

"primary" is the person the message is mainly about. Only list people in "mentioned" if they are explicitly named.
Never use greetings as names. Use null when absent and never invent values."#;

/// Conversational registration turn
pub const REGISTRATION_PROMPT: &str = r#"You are the onboarding assistant of a contact-network service on WhatsApp, talking to someone whose number is not registered yet.
You need three things to create their account: their full name, confirmation that the WhatsApp number they are writing from is their own, and their email.
Be brief, friendly and write in Brazilian Portuguese. Ask for at most one missing item per reply. Never ask again for something already known.

Return ONLY a JSON object:
{
  "name": string | null,            // the user's own name if they stated it in this conversation
  "email": string | null,           // the user's email if they stated it
  "phone_confirmed": boolean | null, // true only if the user clearly confirmed the number is theirs
  "reply": string                   // your next message to the user
}"#;

/// User-turn text for a registration extraction: known fields, then the
/// recent conversation
pub fn registration_context(
    phone_display: &str,
    collected: &CollectedFields,
    history: &[HistoryMessage],
) -> String {
    let mut text = String::new();
    text.push_str("Already known (do not ask again):\n");
    text.push_str(&format!(
        "- name: {}\n",
        collected.name.as_deref().unwrap_or("unknown")
    ));
    text.push_str(&format!(
        "- phone {}: {}\n",
        phone_display,
        if collected.phone_confirmed {
            "confirmed"
        } else {
            "not confirmed"
        }
    ));
    text.push_str(&format!(
        "- email: {}\n",
        collected.email.as_deref().unwrap_or("unknown")
    ));
    text.push_str("\nConversation so far:\n");
    for message in history {
        text.push_str(&format!("{}: {}\n", message.role, message.content));
    }
    text
}
