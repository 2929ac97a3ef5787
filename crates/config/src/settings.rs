//! Main settings module

use config::{Config, Environment, File};
use contact_agent_text_processing::{NameNormalizer, PhoneNormalizer, SubstitutionRule};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Relaxed validation
    #[default]
    Development,
    Staging,
    /// All validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Text-inference backend
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Embedding backend for semantic search
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    /// Match thresholds and graph limits
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Registration conversation
    #[serde(default)]
    pub flow: FlowConfig,

    #[serde(default)]
    pub phone: PhoneConfig,

    #[serde(default)]
    pub names: NamesConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_inference()?;
        self.validate_resolver()?;
        self.validate_flow()?;
        self.validate_text_rules()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port", "must be non-zero"));
        }
        if self.server.timeout_seconds == 0 {
            return Err(ConfigError::invalid("server.timeout_seconds", "must be non-zero"));
        }
        Ok(())
    }

    fn validate_inference(&self) -> Result<(), ConfigError> {
        if self.inference.model.trim().is_empty() {
            return Err(ConfigError::MissingField("inference.model".to_string()));
        }
        if self.inference.timeout_seconds == 0 {
            return Err(ConfigError::invalid("inference.timeout_seconds", "must be non-zero"));
        }
        if self.inference.call_timeout_ms == 0 {
            return Err(ConfigError::invalid("inference.call_timeout_ms", "must be non-zero"));
        }
        if self.embeddings.enabled && self.embeddings.timeout_ms == 0 {
            return Err(ConfigError::invalid("embeddings.timeout_ms", "must be non-zero"));
        }
        if self.embeddings.enabled && self.embeddings.queue_capacity == 0 {
            return Err(ConfigError::invalid("embeddings.queue_capacity", "must be non-zero"));
        }
        if self.environment.is_strict()
            && self.inference.provider == InferenceProvider::OpenAI
            && self.inference.api_key.is_none()
        {
            return Err(ConfigError::MissingField("inference.api_key".to_string()));
        }
        Ok(())
    }

    fn validate_resolver(&self) -> Result<(), ConfigError> {
        let r = &self.resolver;
        for (field, value) in [
            ("resolver.direct_threshold", r.direct_threshold),
            ("resolver.semantic_threshold", r.semantic_threshold),
            ("resolver.suggestion_threshold", r.suggestion_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(
                    field,
                    format!("must be between 0.0 and 1.0, got {}", value),
                ));
            }
        }
        if r.suggestion_threshold > r.direct_threshold {
            return Err(ConfigError::invalid(
                "resolver.suggestion_threshold",
                "must not exceed resolver.direct_threshold",
            ));
        }
        if r.search_limit == 0 {
            return Err(ConfigError::invalid("resolver.search_limit", "must be non-zero"));
        }
        if r.graph_fan_out == 0 {
            return Err(ConfigError::invalid("resolver.graph_fan_out", "must be non-zero"));
        }
        Ok(())
    }

    fn validate_flow(&self) -> Result<(), ConfigError> {
        if self.flow.ttl_hours == 0 {
            return Err(ConfigError::invalid("flow.ttl_hours", "must be non-zero"));
        }
        if self.flow.sweep_interval_seconds == 0 {
            return Err(ConfigError::invalid("flow.sweep_interval_seconds", "must be non-zero"));
        }
        if self.flow.history_window == 0 {
            return Err(ConfigError::invalid("flow.history_window", "must be non-zero"));
        }
        Ok(())
    }

    fn validate_text_rules(&self) -> Result<(), ConfigError> {
        PhoneNormalizer::new(self.phone.default_country_code.clone())
            .map_err(|e| ConfigError::invalid("phone.default_country_code", e.to_string()))?;
        NameNormalizer::new(&self.names.substitutions)
            .map_err(|e| ConfigError::invalid("names.substitutions", e.to_string()))?;
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Inference provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InferenceProvider {
    /// Local Ollama
    #[default]
    Ollama,
    /// OpenAI-compatible API
    #[serde(alias = "openai_compatible")]
    OpenAI,
}

/// Text-inference backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub provider: InferenceProvider,

    #[serde(default = "default_inference_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_inference_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// HTTP request timeout
    #[serde(default = "default_inference_timeout")]
    pub timeout_seconds: u64,

    /// Bound on one classification/extraction call, retries included
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_inference_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_inference_model() -> String {
    "qwen2.5:7b".to_string()
}
fn default_inference_timeout() -> u64 {
    30
}
fn default_call_timeout_ms() -> u64 {
    20_000
}
fn default_max_retries() -> u32 {
    2
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: InferenceProvider::default(),
            endpoint: default_inference_endpoint(),
            model: default_inference_model(),
            api_key: None,
            timeout_seconds: default_inference_timeout(),
            call_timeout_ms: default_call_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl InferenceConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Embedding backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Semantic search is skipped when disabled
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_inference_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,

    /// Pending refresh jobs before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_embedding_timeout_ms() -> u64 {
    5_000
}
fn default_queue_capacity() -> usize {
    256
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_inference_endpoint(),
            model: default_embedding_model(),
            timeout_ms: default_embedding_timeout_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl EmbeddingsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Match thresholds and graph limits.
///
/// Threshold defaults are empirical and expected to be tuned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Name similarity accepted as a direct match
    #[serde(default = "default_direct_threshold")]
    pub direct_threshold: f32,

    /// Cosine similarity accepted from semantic search
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,

    /// Minimum similarity for "did you mean" suggestions
    #[serde(default = "default_suggestion_threshold")]
    pub suggestion_threshold: f32,

    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,

    /// Result cap for text/embedding/bridge searches
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Network traversal depth
    #[serde(default = "default_graph_depth")]
    pub graph_depth: usize,

    /// Contacts surfaced per linked user
    #[serde(default = "default_graph_fan_out")]
    pub graph_fan_out: usize,
}

fn default_direct_threshold() -> f32 {
    0.85
}
fn default_semantic_threshold() -> f32 {
    0.7
}
fn default_suggestion_threshold() -> f32 {
    0.6
}
fn default_max_suggestions() -> usize {
    5
}
fn default_search_limit() -> usize {
    10
}
fn default_graph_depth() -> usize {
    2
}
fn default_graph_fan_out() -> usize {
    20
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            direct_threshold: default_direct_threshold(),
            semantic_threshold: default_semantic_threshold(),
            suggestion_threshold: default_suggestion_threshold(),
            max_suggestions: default_max_suggestions(),
            search_limit: default_search_limit(),
            graph_depth: default_graph_depth(),
            graph_fan_out: default_graph_fan_out(),
        }
    }
}

/// Registration conversation variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlowMode {
    /// Inference every turn; fields accepted in any order
    #[default]
    Conversational,
    /// One field per turn, deterministic parsing
    Rigid,
}

/// Registration flow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    #[serde(default)]
    pub mode: FlowMode,

    /// Inactivity before a flow is abandoned
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,

    /// Attempts before the direct name prompt (N1)
    #[serde(default = "default_name_fallback_attempts")]
    pub name_fallback_attempts: u32,

    /// Extra attempts before the direct email prompt (N2)
    #[serde(default = "default_email_fallback_attempts")]
    pub email_fallback_attempts: u32,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    /// History messages sent to inference each turn
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_ttl_hours() -> u64 {
    24
}
fn default_name_fallback_attempts() -> u32 {
    3
}
fn default_email_fallback_attempts() -> u32 {
    2
}
fn default_sweep_interval() -> u64 {
    300
}
fn default_history_window() -> usize {
    20
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            mode: FlowMode::default(),
            ttl_hours: default_ttl_hours(),
            name_fallback_attempts: default_name_fallback_attempts(),
            email_fallback_attempts: default_email_fallback_attempts(),
            sweep_interval_seconds: default_sweep_interval(),
            history_window: default_history_window(),
        }
    }
}

impl FlowConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 3600)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Attempt count after which the phone confirmation is asked directly
    pub fn phone_fallback_after(&self) -> u32 {
        self.name_fallback_attempts + 2
    }

    /// Attempt count after which the email is asked directly
    pub fn email_fallback_after(&self) -> u32 {
        self.name_fallback_attempts + self.email_fallback_attempts + 2
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneConfig {
    /// Prepended to local numbers; digits only
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
}

fn default_country_code() -> String {
    "55".to_string()
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            default_country_code: default_country_code(),
        }
    }
}

/// Name-matching substitution table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamesConfig {
    /// Applied in order after diacritic folding
    #[serde(default = "SubstitutionRule::defaults")]
    pub substitutions: Vec<SubstitutionRule>,
}

impl Default for NamesConfig {
    fn default() -> Self {
        Self {
            substitutions: SubstitutionRule::defaults(),
        }
    }
}

/// Persistence configuration for ScyllaDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable ScyllaDB for registration flows (false = in-memory only)
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}
fn default_scylla_keyspace() -> String {
    "contact_agent".to_string()
}
fn default_replication_factor() -> u8 {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Expose Prometheus metrics at /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from `config/` and the environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (CONTACT_AGENT_ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings with `dir` as the configuration directory
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default_path = dir.join("default");
    builder = builder.add_source(File::with_name(&default_path.to_string_lossy()).required(false));

    if let Some(env_name) = env {
        let env_path = dir.join(env_name);
        builder = builder.add_source(File::with_name(&env_path.to_string_lossy()).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CONTACT_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        environment = ?settings.environment,
        provider = ?settings.inference.provider,
        flow_mode = ?settings.flow.mode,
        "Settings loaded"
    );

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.resolver.direct_threshold, 0.85);
        assert_eq!(settings.resolver.semantic_threshold, 0.7);
        assert_eq!(settings.resolver.suggestion_threshold, 0.6);
        assert_eq!(settings.resolver.max_suggestions, 5);
        assert_eq!(settings.phone.default_country_code, "55");
        assert_eq!(settings.names.substitutions.len(), 4);
        assert_eq!(settings.flow.mode, FlowMode::Conversational);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_fallback_thresholds() {
        let flow = FlowConfig {
            name_fallback_attempts: 3,
            email_fallback_attempts: 2,
            ..Default::default()
        };
        assert_eq!(flow.phone_fallback_after(), 5);
        assert_eq!(flow.email_fallback_after(), 7);
        assert_eq!(flow.ttl(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_threshold_validation() {
        let mut settings = Settings::default();
        settings.resolver.direct_threshold = 1.5;
        assert!(settings.validate().is_err());

        settings.resolver.direct_threshold = 0.5;
        settings.resolver.suggestion_threshold = 0.6;
        assert!(settings.validate().is_err());

        settings.resolver.direct_threshold = 0.85;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_duration_validation() {
        let mut settings = Settings::default();
        settings.flow.ttl_hours = 0;
        assert!(settings.validate().is_err());
        settings.flow.ttl_hours = 24;

        settings.inference.call_timeout_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_text_rule_validation() {
        let mut settings = Settings::default();
        settings.phone.default_country_code = "+55".to_string();
        assert!(settings.validate().is_err());
        settings.phone.default_country_code = "55".to_string();

        settings.names.substitutions.push(SubstitutionRule::new("[", "x"));
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_strict_environment_requires_api_key() {
        let mut settings = Settings::default();
        settings.inference.provider = InferenceProvider::OpenAI;
        assert!(settings.validate().is_ok());

        settings.environment = RuntimeEnvironment::Production;
        assert!(settings.validate().is_err());

        settings.inference.api_key = Some("sk-test".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.yaml"),
            r#"
server:
  port: 9000
resolver:
  direct_threshold: 0.9
flow:
  mode: rigid
names:
  substitutions:
    - pattern: "ph"
      replacement: "f"
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("staging.yaml"),
            r#"
environment: staging
server:
  port: 9100
"#,
        )
        .unwrap();

        let base = load_settings_from(dir.path(), None).unwrap();
        assert_eq!(base.server.port, 9000);
        assert_eq!(base.resolver.direct_threshold, 0.9);
        assert_eq!(base.resolver.semantic_threshold, 0.7);
        assert_eq!(base.flow.mode, FlowMode::Rigid);
        assert_eq!(base.names.substitutions.len(), 1);

        let staged = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(staged.server.port, 9100);
        assert_eq!(staged.environment, RuntimeEnvironment::Staging);
        assert_eq!(staged.resolver.direct_threshold, 0.9);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.yaml"),
            "resolver:\n  semantic_threshold: 2.0\n",
        )
        .unwrap();
        assert!(load_settings_from(dir.path(), None).is_err());
    }

    #[test]
    fn test_missing_directory_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(&dir.path().join("absent"), None).unwrap();
        assert_eq!(settings.server.port, 8080);
    }
}
