//! Entity extraction
//!
//! Turns free text into [`ExtractedContactData`] through the text-inference
//! collaborator. The model's JSON is never trusted structurally: every field
//! is checked on receipt and anything malformed yields an explicit
//! [`ExtractionFailure`] with the raw response kept for diagnostics.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use contact_agent_core::{
    CollectedFields, ExtractedContactData, HistoryMessage, InferenceParams, MentionedPerson,
    TextInferenceClient,
};
use contact_agent_text_processing::{fold, PhoneNormalizer};

use crate::intent::DEFAULT_GREETINGS;
use crate::prompts::{
    registration_context, CONNECTIONS_PROMPT, EXTRACTION_PROMPT, REGISTRATION_PROMPT,
};

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("valid email regex")
});

static EMAIL_IN_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}")
        .expect("valid email regex")
});

/// Minimum characters for an extracted name
pub const MIN_NAME_CHARS: usize = 2;

/// Confidence assumed when the model omits it
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Syntactic email check
pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email.trim())
}

/// First syntactically valid email in free text, lowercased
pub fn find_email(text: &str) -> Option<String> {
    EMAIL_IN_TEXT
        .find(text)
        .map(|m| m.as_str().trim_end_matches('.').to_lowercase())
        .filter(|e| is_valid_email(e))
}

/// Why an extraction was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionFailure {
    #[error("empty input")]
    EmptyInput,

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("inference timed out")]
    Timeout,

    #[error("response is not a JSON object: {0}")]
    InvalidJson(String),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("extracted name is a greeting: {0}")]
    GreetingAsName(String),

    #[error("extracted name too short: {0}")]
    NameTooShort(String),

    #[error("no contact data in response")]
    NoData,
}

impl ExtractionFailure {
    fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        ExtractionFailure::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Outcome of a single-contact extraction
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    Success(ExtractedContactData),
    Failure {
        reason: ExtractionFailure,
        raw_response: Option<String>,
    },
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Success(_))
    }

    pub fn data(&self) -> Option<&ExtractedContactData> {
        match self {
            ExtractionResult::Success(data) => Some(data),
            ExtractionResult::Failure { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&ExtractionFailure> {
        match self {
            ExtractionResult::Success(_) => None,
            ExtractionResult::Failure { reason, .. } => Some(reason),
        }
    }
}

/// Outcome of a primary-plus-mentions extraction
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionsExtraction {
    Success {
        primary: ExtractedContactData,
        mentioned: Vec<MentionedPerson>,
    },
    Failure {
        reason: ExtractionFailure,
        raw_response: Option<String>,
    },
}

impl ConnectionsExtraction {
    pub fn is_success(&self) -> bool {
        matches!(self, ConnectionsExtraction::Success { .. })
    }
}

/// Fields volunteered in one registration turn, plus the model's reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationTurn {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_confirmed: Option<bool>,
    pub reply: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationExtraction {
    Success(RegistrationTurn),
    Failure {
        reason: ExtractionFailure,
        raw_response: Option<String>,
    },
}

/// Extracts contact data through the text-inference collaborator
pub struct EntityExtractor {
    client: Arc<dyn TextInferenceClient>,
    phones: PhoneNormalizer,
    greetings: Vec<String>,
    timeout: Duration,
}

impl EntityExtractor {
    pub fn new(
        client: Arc<dyn TextInferenceClient>,
        phones: PhoneNormalizer,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            phones,
            greetings: DEFAULT_GREETINGS.iter().map(|g| g.to_string()).collect(),
            timeout,
        }
    }

    /// Replace the folded greeting list used for name rejection
    pub fn with_greetings(mut self, greetings: Vec<String>) -> Self {
        self.greetings = greetings;
        self
    }

    pub async fn extract(&self, text: &str) -> ExtractionResult {
        if text.trim().is_empty() {
            return ExtractionResult::Failure {
                reason: ExtractionFailure::EmptyInput,
                raw_response: None,
            };
        }

        let raw = match self
            .call(EXTRACTION_PROMPT, text, InferenceParams::extraction())
            .await
        {
            Ok(raw) => raw,
            Err(reason) => {
                return ExtractionResult::Failure {
                    reason,
                    raw_response: None,
                }
            },
        };

        let parsed = json_object(&raw).and_then(|obj| self.contact_from(&obj, text));
        match parsed {
            Ok(data) => {
                tracing::debug!(
                    name = ?data.name,
                    confidence = data.confidence,
                    tags = data.tags.len(),
                    "Extracted contact data"
                );
                ExtractionResult::Success(data)
            },
            Err(reason) => {
                tracing::info!(reason = %reason, "Extraction rejected");
                ExtractionResult::Failure {
                    reason,
                    raw_response: Some(raw),
                }
            },
        }
    }

    pub async fn extract_with_connections(&self, text: &str) -> ConnectionsExtraction {
        if text.trim().is_empty() {
            return ConnectionsExtraction::Failure {
                reason: ExtractionFailure::EmptyInput,
                raw_response: None,
            };
        }

        let raw = match self
            .call(CONNECTIONS_PROMPT, text, InferenceParams::extraction())
            .await
        {
            Ok(raw) => raw,
            Err(reason) => {
                return ConnectionsExtraction::Failure {
                    reason,
                    raw_response: None,
                }
            },
        };

        match json_object(&raw).and_then(|obj| self.connections_from(&obj, text)) {
            Ok((primary, mentioned)) => {
                tracing::debug!(
                    name = ?primary.name,
                    mentioned = mentioned.len(),
                    "Extracted contact with connections"
                );
                ConnectionsExtraction::Success { primary, mentioned }
            },
            Err(reason) => {
                tracing::info!(reason = %reason, "Connections extraction rejected");
                ConnectionsExtraction::Failure {
                    reason,
                    raw_response: Some(raw),
                }
            },
        }
    }

    /// One conversational registration turn. Known fields go into the
    /// prompt so the model does not ask for them again.
    pub async fn extract_registration(
        &self,
        phone: &str,
        collected: &CollectedFields,
        history: &[HistoryMessage],
    ) -> RegistrationExtraction {
        let context = registration_context(&self.phones.format_display(phone), collected, history);

        let raw = match self
            .call(REGISTRATION_PROMPT, &context, InferenceParams::conversation())
            .await
        {
            Ok(raw) => raw,
            Err(reason) => {
                return RegistrationExtraction::Failure {
                    reason,
                    raw_response: None,
                }
            },
        };

        match json_object(&raw).and_then(|obj| self.registration_from(&obj)) {
            Ok(turn) => RegistrationExtraction::Success(turn),
            Err(reason) => {
                tracing::info!(reason = %reason, "Registration extraction rejected");
                RegistrationExtraction::Failure {
                    reason,
                    raw_response: Some(raw),
                }
            },
        }
    }

    async fn call(
        &self,
        prompt: &str,
        text: &str,
        params: InferenceParams,
    ) -> Result<String, ExtractionFailure> {
        match tokio::time::timeout(self.timeout, self.client.complete(prompt, text, &params)).await
        {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Extraction inference failed");
                Err(ExtractionFailure::Inference(e.to_string()))
            },
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Extraction inference timed out"
                );
                Err(ExtractionFailure::Timeout)
            },
        }
    }

    fn is_greeting(&self, name: &str) -> bool {
        let folded = fold(name);
        self.greetings.iter().any(|g| *g == folded)
    }

    /// Name rules shared by every extraction path
    fn check_name(&self, name: &str) -> Result<(), ExtractionFailure> {
        if self.is_greeting(name) {
            return Err(ExtractionFailure::GreetingAsName(name.to_string()));
        }
        if name.chars().count() < MIN_NAME_CHARS {
            return Err(ExtractionFailure::NameTooShort(name.to_string()));
        }
        Ok(())
    }

    fn contact_from(
        &self,
        obj: &Map<String, Value>,
        source_text: &str,
    ) -> Result<ExtractedContactData, ExtractionFailure> {
        let name = string_field(obj, "name")?;
        if let Some(ref name) = name {
            self.check_name(name)?;
        }

        let mut phone = phone_field(obj, "phone")?;
        if phone.is_none() {
            // The model sometimes misses a number that is plainly in the text
            let found = self.phones.find_in_text(source_text);
            if found.len() == 1 {
                phone = found.into_iter().next();
            }
        }

        let email = match string_field(obj, "email")? {
            Some(email) if is_valid_email(&email) => Some(email.to_lowercase()),
            Some(email) => {
                tracing::debug!(email = %email, "Dropping invalid extracted email");
                None
            },
            None => None,
        };

        let data = ExtractedContactData {
            name,
            company: string_field(obj, "company")?,
            position: string_field(obj, "position")?,
            phone,
            email,
            location: string_field(obj, "location")?,
            context: string_field(obj, "context")?,
            tags: tags_field(obj, "tags")?,
            confidence: confidence_field(obj, "confidence")?,
        };

        if data.is_empty() {
            return Err(ExtractionFailure::NoData);
        }
        Ok(data)
    }

    fn connections_from(
        &self,
        obj: &Map<String, Value>,
        source_text: &str,
    ) -> Result<(ExtractedContactData, Vec<MentionedPerson>), ExtractionFailure> {
        let primary = match obj.get("primary").or_else(|| obj.get("primary_contact")) {
            Some(Value::Object(primary)) => self.contact_from(primary, source_text)?,
            Some(Value::Null) | None if obj.contains_key("name") => {
                self.contact_from(obj, source_text)?
            },
            Some(Value::Null) | None => return Err(ExtractionFailure::NoData),
            Some(_) => {
                return Err(ExtractionFailure::invalid_field("primary", "expected an object"))
            },
        };

        let entries = match obj
            .get("mentioned")
            .or_else(|| obj.get("mentioned_connections"))
            .or_else(|| obj.get("mentionedConnections"))
        {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries.clone(),
            Some(_) => {
                return Err(ExtractionFailure::invalid_field("mentioned", "expected an array"))
            },
        };

        let primary_name = primary.name.as_deref().map(fold);
        let mut mentioned: Vec<MentionedPerson> = Vec::new();
        for entry in entries {
            match self.mention_from(&entry) {
                Ok(person) => {
                    let folded = fold(&person.name);
                    if primary_name.as_deref() == Some(folded.as_str()) {
                        continue;
                    }
                    if mentioned.iter().any(|m| fold(&m.name) == folded) {
                        continue;
                    }
                    mentioned.push(person);
                },
                Err(reason) => {
                    tracing::debug!(reason = %reason, "Dropping mentioned person");
                },
            }
        }

        Ok((primary, mentioned))
    }

    fn mention_from(&self, entry: &Value) -> Result<MentionedPerson, ExtractionFailure> {
        let obj = match entry {
            Value::Object(obj) => obj,
            _ => return Err(ExtractionFailure::invalid_field("mentioned", "expected an object")),
        };
        let name = string_field(obj, "name")?
            .ok_or_else(|| ExtractionFailure::invalid_field("mentioned.name", "missing"))?;
        self.check_name(&name)?;

        Ok(MentionedPerson {
            name,
            description: string_field(obj, "description")?,
            tags: tags_field(obj, "tags")?,
            phone: phone_field(obj, "phone")?,
        })
    }

    fn registration_from(
        &self,
        obj: &Map<String, Value>,
    ) -> Result<RegistrationTurn, ExtractionFailure> {
        // Bad values here are dropped, not fatal: the flow can always ask again
        let name = string_field(obj, "name")
            .ok()
            .flatten()
            .filter(|name| self.check_name(name).is_ok());
        let email = string_field(obj, "email")
            .ok()
            .flatten()
            .filter(|email| is_valid_email(email))
            .map(|email| email.to_lowercase());
        let phone_confirmed = match obj
            .get("phone_confirmed")
            .or_else(|| obj.get("phoneConfirmed"))
        {
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::String(s)) => parse_yes_no(s),
            _ => None,
        };
        let reply = string_field(obj, "reply").ok().flatten();

        Ok(RegistrationTurn {
            name,
            email,
            phone_confirmed,
            reply,
        })
    }
}

/// Interpret a yes/no answer in Portuguese or English
pub fn parse_yes_no(text: &str) -> Option<bool> {
    const YES: &[&str] = &[
        "sim", "s", "isso", "isso mesmo", "correto", "certo", "confirmo", "e sim", "e meu",
        "yes", "y", "true", "ok",
    ];
    const NO: &[&str] = &["nao", "n", "errado", "nao e", "nao e meu", "no", "false"];

    let folded = fold(text);
    if YES.contains(&folded.as_str()) {
        return Some(true);
    }
    if NO.contains(&folded.as_str()) {
        return Some(false);
    }
    let first = folded.split_whitespace().next()?;
    match first {
        "sim" | "yes" | "isso" | "confirmo" => Some(true),
        "nao" | "no" => Some(false),
        _ => None,
    }
}

/// The first `{` to the last `}` of the response, parsed as an object
fn json_object(raw: &str) -> Result<Map<String, Value>, ExtractionFailure> {
    let start = raw
        .find('{')
        .ok_or_else(|| ExtractionFailure::InvalidJson("no object found".to_string()))?;
    let end = raw
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| ExtractionFailure::InvalidJson("unterminated object".to_string()))?;

    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(Value::Object(obj)) => Ok(obj),
        Ok(_) => Err(ExtractionFailure::InvalidJson("not an object".to_string())),
        Err(e) => Err(ExtractionFailure::InvalidJson(e.to_string())),
    }
}

/// String or null; blank and "null" are absent
fn string_field(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, ExtractionFailure> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("null") {
                Ok(None)
            } else {
                Ok(Some(s.to_string()))
            }
        },
        Some(other) => Err(ExtractionFailure::invalid_field(
            key,
            format!("expected string, got {}", json_type(other)),
        )),
    }
}

/// String or number, reduced to digits
fn phone_field(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, ExtractionFailure> {
    let raw = match obj.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(ExtractionFailure::invalid_field(
                key,
                format!("expected string, got {}", json_type(other)),
            ))
        },
    };
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    Ok(if digits.is_empty() { None } else { Some(digits) })
}

/// Array of strings or a comma-separated string; trimmed, deduplicated
/// case-insensitively
fn tags_field(obj: &Map<String, Value>, key: &str) -> Result<Vec<String>, ExtractionFailure> {
    let raw: Vec<String> = match obj.get(key) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        Some(other) => {
            return Err(ExtractionFailure::invalid_field(
                key,
                format!("expected array, got {}", json_type(other)),
            ))
        },
    };

    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let tag = tag.trim();
        if tag.is_empty() || tags.iter().any(|t| t.to_lowercase() == tag.to_lowercase()) {
            continue;
        }
        tags.push(tag.to_string());
    }
    Ok(tags)
}

/// Number (or numeric string) clamped to [0, 1]
fn confidence_field(obj: &Map<String, Value>, key: &str) -> Result<f32, ExtractionFailure> {
    let value = match obj.get(key) {
        None | Some(Value::Null) => return Ok(DEFAULT_CONFIDENCE),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match value {
        Some(v) if v.is_finite() => Ok(v.clamp(0.0, 1.0) as f32),
        _ => Err(ExtractionFailure::invalid_field(key, "expected a number")),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedInference;
    use contact_agent_core::Error;

    fn extractor(client: Arc<ScriptedInference>) -> EntityExtractor {
        EntityExtractor::new(client, PhoneNormalizer::default(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_extract_valid_contact() {
        let client = Arc::new(ScriptedInference::with_responses([r#"```json
{"name": "João Silva", "company": "XYZ", "position": "advogado",
 "phone": "(21) 99999-8888", "email": "JOAO@XYZ.COM", "location": null,
 "context": "", "tags": ["direito", "Direito", " startups "], "confidence": 0.92}
```"#]));
        let result = extractor(client)
            .extract("João Silva, advogado na XYZ, 21999998888")
            .await;

        let data = result.data().expect("success");
        assert_eq!(data.name.as_deref(), Some("João Silva"));
        assert_eq!(data.company.as_deref(), Some("XYZ"));
        assert_eq!(data.phone.as_deref(), Some("21999998888"));
        assert_eq!(data.email.as_deref(), Some("joao@xyz.com"));
        assert_eq!(data.location, None);
        assert_eq!(data.context, None);
        assert_eq!(data.tags, vec!["direito".to_string(), "startups".to_string()]);
        assert!((data.confidence - 0.92).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_greeting_name_is_rejected() {
        let raw = r#"{"name": "Bom dia", "company": null, "confidence": 0.4}"#;
        let client = Arc::new(ScriptedInference::with_responses([raw]));
        let result = extractor(client).extract("Bom dia! Tudo certo por aí?").await;

        assert_eq!(
            result,
            ExtractionResult::Failure {
                reason: ExtractionFailure::GreetingAsName("Bom dia".to_string()),
                raw_response: Some(raw.to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_one_char_name_is_rejected() {
        let client = Arc::new(ScriptedInference::with_responses([r#"{"name": "J"}"#]));
        let result = extractor(client).extract("J da padaria do bairro").await;
        assert_eq!(
            result.failure(),
            Some(&ExtractionFailure::NameTooShort("J".to_string()))
        );
    }

    #[tokio::test]
    async fn test_wrong_field_type_is_rejected() {
        let client = Arc::new(ScriptedInference::with_responses([
            r#"{"name": "Ana", "company": ["Acme", "Beta"]}"#,
        ]));
        let result = extractor(client).extract("Ana trabalha na Acme e na Beta").await;
        assert!(matches!(
            result.failure(),
            Some(ExtractionFailure::InvalidField { field, .. }) if field == "company"
        ));
    }

    #[tokio::test]
    async fn test_non_json_keeps_raw_response() {
        let client = Arc::new(ScriptedInference::with_responses([
            "Desculpe, não entendi a mensagem.",
        ]));
        match extractor(client).extract("asdkjh qwe zzz").await {
            ExtractionResult::Failure {
                reason: ExtractionFailure::InvalidJson(_),
                raw_response,
            } => assert_eq!(raw_response.as_deref(), Some("Desculpe, não entendi a mensagem.")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_null_is_no_data() {
        let client = Arc::new(ScriptedInference::with_responses([
            r#"{"name": null, "company": null, "tags": [], "confidence": 0.1}"#,
        ]));
        let result = extractor(client).extract("qual a previsão do tempo?").await;
        assert_eq!(result.failure(), Some(&ExtractionFailure::NoData));
    }

    #[tokio::test]
    async fn test_phone_recovered_from_text() {
        let client = Arc::new(ScriptedInference::with_responses([
            r#"{"name": "Carlos Lima", "phone": null}"#,
        ]));
        let result = extractor(client)
            .extract("Carlos Lima, meu dentista, +55 21 8765-4321")
            .await;
        assert_eq!(
            result.data().and_then(|d| d.phone.as_deref()),
            Some("552187654321")
        );
    }

    #[tokio::test]
    async fn test_inference_error_and_empty_input() {
        let client = Arc::new(ScriptedInference::new());
        client.push_error(Error::Inference("503".to_string()));
        let extractor = extractor(client.clone());

        let result = extractor.extract("Ana Souza da Acme").await;
        assert!(matches!(
            result,
            ExtractionResult::Failure {
                reason: ExtractionFailure::Inference(_),
                raw_response: None
            }
        ));

        let result = extractor.extract("   ").await;
        assert_eq!(result.failure(), Some(&ExtractionFailure::EmptyInput));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_confidence_defaults() {
        let client = Arc::new(ScriptedInference::with_responses([
            r#"{"name": "Bia", "confidence": 7, "tags": "saude, yoga"}"#,
            r#"{"name": "Bia"}"#,
        ]));
        let extractor = extractor(client);

        let clamped = extractor.extract("Bia, professora de yoga").await;
        let data = clamped.data().unwrap();
        assert_eq!(data.confidence, 1.0);
        assert_eq!(data.tags, vec!["saude".to_string(), "yoga".to_string()]);

        let defaulted = extractor.extract("Bia, professora de yoga").await;
        assert_eq!(defaulted.data().unwrap().confidence, DEFAULT_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_connections_extraction() {
        let client = Arc::new(ScriptedInference::with_responses([r#"{
            "primary": {"name": "Pedro Alves", "company": "Fintech X", "tags": ["fintech"]},
            "mentioned": [
                {"name": "Paula Reis", "description": "sócia do Pedro, investidora", "tags": ["investidora"], "phone": null},
                {"name": "oi", "description": "saudação"},
                {"name": "Pedro Alves", "description": "duplicate of primary"},
                "not an object"
            ]
        }"#]));
        let result = extractor(client)
            .extract_with_connections("Pedro Alves da Fintech X, sócio da Paula Reis que investe em startups")
            .await;

        match result {
            ConnectionsExtraction::Success { primary, mentioned } => {
                assert_eq!(primary.name.as_deref(), Some("Pedro Alves"));
                assert_eq!(mentioned.len(), 1);
                assert_eq!(mentioned[0].name, "Paula Reis");
                assert_eq!(mentioned[0].tags, vec!["investidora".to_string()]);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connections_invalid_primary() {
        let client = Arc::new(ScriptedInference::with_responses([
            r#"{"primary": {"name": "Olá"}, "mentioned": []}"#,
        ]));
        let result = extractor(client)
            .extract_with_connections("Olá, tudo bem com você hoje?")
            .await;
        assert!(matches!(
            result,
            ConnectionsExtraction::Failure {
                reason: ExtractionFailure::GreetingAsName(_),
                raw_response: Some(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_registration_turn_drops_bad_values() {
        let client = Arc::new(ScriptedInference::with_responses([r#"{
            "name": "oi", "email": "carla@", "phone_confirmed": "sim",
            "reply": "Legal! Qual é o seu nome?"
        }"#]));
        let turn = extractor(client.clone())
            .extract_registration(
                "5521987654321",
                &CollectedFields::default(),
                &[HistoryMessage::user("oi, sim esse número é meu")],
            )
            .await;

        assert_eq!(
            turn,
            RegistrationExtraction::Success(RegistrationTurn {
                name: None,
                email: None,
                phone_confirmed: Some(true),
                reply: Some("Legal! Qual é o seu nome?".to_string()),
            })
        );
        let calls = client.calls();
        assert!(calls[0].text.contains("+55 (21) 98765-4321"));
        assert_eq!(calls[0].params, InferenceParams::conversation());
    }

    #[test]
    fn test_email_helpers() {
        assert!(is_valid_email("ana.souza+crm@acme.com.br"));
        assert!(!is_valid_email("ana@acme"));
        assert!(!is_valid_email("ana souza@acme.com"));
        assert_eq!(
            find_email("meu email é Carla.Dias@Exemplo.com."),
            Some("carla.dias@exemplo.com".to_string())
        );
        assert_eq!(find_email("não tenho"), None);
    }

    #[test]
    fn test_parse_yes_no() {
        assert_eq!(parse_yes_no("Sim!"), Some(true));
        assert_eq!(parse_yes_no("sim, é meu"), Some(true));
        assert_eq!(parse_yes_no("Não"), Some(false));
        assert_eq!(parse_yes_no("talvez"), None);
    }
}
