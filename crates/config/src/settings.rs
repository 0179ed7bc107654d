//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if this is a production environment
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
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Advisor pipeline configuration
    #[serde(default)]
    pub advisor: AdvisorConfig,

    /// Chat-completion provider configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embeddings provider configuration (semantic fallback)
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    /// Escalation policy
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Persistence configuration (ScyllaDB)
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_advisor()?;
        self.validate_llm()?;
        self.validate_embeddings()?;
        self.validate_escalation()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_seconds".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        let rate_limit = &server.rate_limit;
        if rate_limit.enabled {
            if rate_limit.requests_per_second == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "server.rate_limit.requests_per_second".to_string(),
                    message: "Must be at least 1 when rate limiting is enabled".to_string(),
                });
            }

            if rate_limit.burst_multiplier < 1.0 {
                return Err(ConfigError::InvalidValue {
                    field: "server.rate_limit.burst_multiplier".to_string(),
                    message: format!("Must be at least 1.0, got {}", rate_limit.burst_multiplier),
                });
            }
        }

        if self.environment.is_production() && server.auth.enabled && server.auth.api_key.is_none()
        {
            return Err(ConfigError::InvalidValue {
                field: "server.auth.api_key".to_string(),
                message: "API key must be set when auth is enabled in production".to_string(),
            });
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate requests."
            );
        }

        Ok(())
    }

    fn validate_advisor(&self) -> Result<(), ConfigError> {
        let advisor = &self.advisor;

        if advisor.history_turns == 0 || advisor.history_turns > 50 {
            return Err(ConfigError::InvalidValue {
                field: "advisor.history_turns".to_string(),
                message: format!("Must be between 1 and 50, got {}", advisor.history_turns),
            });
        }

        if advisor.care_events_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "advisor.care_events_limit".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if advisor.invoices_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "advisor.invoices_limit".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if advisor.synthesis_temperature < 0.0 || advisor.synthesis_temperature > 2.0 {
            return Err(ConfigError::InvalidValue {
                field: "advisor.synthesis_temperature".to_string(),
                message: format!(
                    "Must be between 0.0 and 2.0, got {}",
                    advisor.synthesis_temperature
                ),
            });
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        if self.llm.model.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "llm.model".to_string(),
                message: "Model name cannot be empty".to_string(),
            });
        }

        if self.llm.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeout_seconds".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        if self.environment.is_strict()
            && self.llm.api_key.is_none()
            && std::env::var("ANTHROPIC_API_KEY").is_err()
        {
            return Err(ConfigError::MissingField(
                "llm.api_key (or ANTHROPIC_API_KEY)".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_embeddings(&self) -> Result<(), ConfigError> {
        let emb = &self.embeddings;
        if !emb.enabled {
            return Ok(());
        }

        if !(0.0..=1.0).contains(&emb.similarity_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "embeddings.similarity_threshold".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", emb.similarity_threshold),
            });
        }

        if emb.neighbors == 0 {
            return Err(ConfigError::InvalidValue {
                field: "embeddings.neighbors".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if emb.scan_limit < emb.neighbors {
            return Err(ConfigError::InvalidValue {
                field: "embeddings.scan_limit".to_string(),
                message: format!(
                    "Cannot be smaller than neighbors ({})",
                    emb.neighbors
                ),
            });
        }

        Ok(())
    }

    fn validate_escalation(&self) -> Result<(), ConfigError> {
        if self.escalation.rules.is_empty() {
            tracing::warn!(
                "No escalation rules configured; emergency language will not short-circuit"
            );
            return Ok(());
        }

        for rule in &self.escalation.rules {
            if rule.keywords.is_empty() && rule.sentiment.is_none() {
                return Err(ConfigError::InvalidValue {
                    field: format!("escalation.rules.{}", rule.name),
                    message: "Rule must declare keywords or a sentiment trigger".to_string(),
                });
            }

            if rule.auto_response.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("escalation.rules.{}", rule.name),
                    message: "Rule must carry a canned response".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
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
            cors_enabled: default_true(),
            // Empty by default - must be explicitly configured for production
            cors_origins: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Enable authentication (set to false for development)
    #[serde(default)]
    pub enabled: bool,

    /// API key for simple authentication (set via SENTINEL__SERVER__AUTH__API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Paths that bypass authentication (e.g., health checks)
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec![
        "/health".to_string(),
        "/ready".to_string(),
        "/metrics".to_string(),
    ]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            public_paths: default_public_paths(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum requests per second per client key
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Burst allowance (multiple of rate limit)
    #[serde(default = "default_burst_multiplier")]
    pub burst_multiplier: f32,
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_burst_multiplier() -> f32 {
    2.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: default_requests_per_second(),
            burst_multiplier: default_burst_multiplier(),
        }
    }
}

/// Advisor pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Prior turns included in the prompt, newest N in chronological order
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Care events attached when the persona holds the patient_data scope
    #[serde(default = "default_care_events_limit")]
    pub care_events_limit: usize,

    /// Care-event lookback window in hours
    #[serde(default = "default_care_events_window")]
    pub care_events_window_hours: i64,

    /// Outstanding invoices attached when the persona holds financial_data
    #[serde(default = "default_invoices_limit")]
    pub invoices_limit: usize,

    /// Persona cache TTL in seconds; refresh happens at the request boundary
    #[serde(default = "default_persona_ttl")]
    pub persona_ttl_seconds: u64,

    /// Persona catalog file (YAML); compiled-in defaults when absent
    #[serde(default = "default_personas_path")]
    pub personas_path: String,

    /// Sampling temperature for the collaborate synthesis call
    #[serde(default = "default_synthesis_temperature")]
    pub synthesis_temperature: f32,

    /// Output budget for the collaborate synthesis call
    #[serde(default = "default_synthesis_max_tokens")]
    pub synthesis_max_tokens: u32,
}

fn default_history_turns() -> usize {
    10
}
fn default_care_events_limit() -> usize {
    10
}
fn default_care_events_window() -> i64 {
    24
}
fn default_invoices_limit() -> usize {
    5
}
fn default_persona_ttl() -> u64 {
    300
}
fn default_personas_path() -> String {
    "config/personas.yaml".to_string()
}
fn default_synthesis_temperature() -> f32 {
    0.5
}
fn default_synthesis_max_tokens() -> u32 {
    500
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            history_turns: default_history_turns(),
            care_events_limit: default_care_events_limit(),
            care_events_window_hours: default_care_events_window(),
            invoices_limit: default_invoices_limit(),
            persona_ttl_seconds: default_persona_ttl(),
            personas_path: default_personas_path(),
            synthesis_temperature: default_synthesis_temperature(),
            synthesis_max_tokens: default_synthesis_max_tokens(),
        }
    }
}

/// Chat-completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API endpoint base
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Model identifier
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key; falls back to ANTHROPIC_API_KEY when unset
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

fn default_llm_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_llm_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}
fn default_llm_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            api_key: None,
            timeout_seconds: default_llm_timeout(),
        }
    }
}

/// Embeddings provider configuration, used only by the semantic fallback
/// and the log-row embedding annotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Enable the semantic fallback path
    #[serde(default)]
    pub enabled: bool,

    /// API endpoint base (OpenAI-compatible)
    #[serde(default = "default_embeddings_endpoint")]
    pub endpoint: String,

    /// Model identifier
    #[serde(default = "default_embeddings_model")]
    pub model: String,

    /// API key; falls back to OPENAI_API_KEY when unset
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_embeddings_timeout")]
    pub timeout_seconds: u64,

    /// Cosine similarity floor for a neighbor to count
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Neighbors voting on the fallback category
    #[serde(default = "default_neighbors")]
    pub neighbors: usize,

    /// Recent rows scanned per lookup
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
}

fn default_embeddings_endpoint() -> String {
    "https://api.openai.com".to_string()
}
fn default_embeddings_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embeddings_timeout() -> u64 {
    30
}
fn default_similarity_threshold() -> f32 {
    0.7
}
fn default_neighbors() -> usize {
    3
}
fn default_scan_limit() -> usize {
    256
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_embeddings_endpoint(),
            model: default_embeddings_model(),
            api_key: None,
            timeout_seconds: default_embeddings_timeout(),
            similarity_threshold: default_similarity_threshold(),
            neighbors: default_neighbors(),
            scan_limit: default_scan_limit(),
        }
    }
}

/// One escalation rule: keyword membership and/or a sentiment trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRuleConfig {
    /// Rule name, recorded on the escalation event
    pub name: String,

    /// Case-insensitive substrings scanned against the input text
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Optional sentiment trigger ("urgent", "negative")
    #[serde(default)]
    pub sentiment: Option<String>,

    /// Escalation type, recorded on the event and returned to the caller
    pub escalation_type: String,

    /// Who the notifier should reach out of band
    #[serde(default)]
    pub targets: Vec<String>,

    /// Canned, persona-independent safety response
    pub auto_response: String,
}

/// Escalation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Ordered rules; first match wins
    #[serde(default = "default_escalation_rules")]
    pub rules: Vec<EscalationRuleConfig>,
}

fn default_escalation_rules() -> Vec<EscalationRuleConfig> {
    vec![EscalationRuleConfig {
        name: "medical_emergency".to_string(),
        keywords: vec![
            "emergency".to_string(),
            "911".to_string(),
            "urgent".to_string(),
            "immediate".to_string(),
            "crisis".to_string(),
            "chest pain".to_string(),
            "can't breathe".to_string(),
            "cannot breathe".to_string(),
            "unconscious".to_string(),
            "unresponsive".to_string(),
            "not responding".to_string(),
            "isn't responding".to_string(),
            "fell".to_string(),
            "fallen".to_string(),
            "severe pain".to_string(),
            "bleeding".to_string(),
            "stroke".to_string(),
            "heart attack".to_string(),
            "overdose".to_string(),
        ],
        sentiment: None,
        escalation_type: "medical_emergency".to_string(),
        targets: vec!["on_call_nurse".to_string(), "facility_manager".to_string()],
        auto_response: "If this is a medical emergency, please call 911 immediately. \
                        Our on-call care team has been notified and will reach out to you \
                        right away. You can also reach the facility any time at \
                        (215) 774-0743."
            .to_string(),
    }]
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            rules: default_escalation_rules(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable tracing
    #[serde(default = "default_true")]
    pub tracing_enabled: bool,

    /// OTLP endpoint for traces
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Enable metrics
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
            tracing_enabled: true,
            otlp_endpoint: None,
            metrics_enabled: true,
        }
    }
}

/// Persistence configuration for ScyllaDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable ScyllaDB persistence (false = in-memory only)
    #[serde(default)]
    pub enabled: bool,

    /// ScyllaDB host addresses
    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    /// ScyllaDB keyspace name
    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,

    /// ScyllaDB replication factor
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,

    /// Load personas from the agent_definitions table instead of the catalog
    #[serde(default)]
    pub store_backed_personas: bool,
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}

fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "sentinel_advisor".to_string())
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
            store_backed_personas: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (SENTINEL__ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("SENTINEL")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.advisor.history_turns, 10);
        assert_eq!(settings.llm.model, "claude-3-5-sonnet-20241022");
        assert!(!settings.embeddings.enabled);
        assert!(!settings.persistence.enabled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_server_validation() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());

        settings.server.port = 8080;
        settings.server.rate_limit.burst_multiplier = 0.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_advisor_validation() {
        let mut settings = Settings::default();
        settings.advisor.history_turns = 0;
        assert!(settings.validate().is_err());

        settings.advisor.history_turns = 100;
        assert!(settings.validate().is_err());

        settings.advisor.history_turns = 10;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_embeddings_validation_only_when_enabled() {
        let mut settings = Settings::default();
        settings.embeddings.similarity_threshold = 5.0;
        // Disabled section is not validated
        assert!(settings.validate().is_ok());

        settings.embeddings.enabled = true;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_escalation_rule_validation() {
        let mut settings = Settings::default();
        settings.escalation.rules[0].keywords.clear();
        // Still valid if a sentiment trigger remains? There is none, so invalid.
        assert!(settings.validate().is_err());

        settings.escalation.rules[0].sentiment = Some("urgent".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_default_escalation_rule_covers_fall_language() {
        let settings = Settings::default();
        let rule = &settings.escalation.rules[0];
        assert!(rule.keywords.iter().any(|k| k == "fell"));
        assert!(rule.keywords.iter().any(|k| k == "isn't responding"));
        assert!(rule.auto_response.contains("(215) 774-0743"));
        assert!(rule.auto_response.contains("911"));
    }

    #[test]
    fn test_file_layering() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::create_dir(&path).unwrap();
        let mut f = std::fs::File::create(path.join("default.yaml")).unwrap();
        writeln!(f, "server:\n  port: 9100\nadvisor:\n  history_turns: 4").unwrap();

        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let settings = load_settings(None).unwrap();
        std::env::set_current_dir(prev).unwrap();

        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.advisor.history_turns, 4);
    }
}
