use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Wrapper for sensitive strings with redacted Debug/Display.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(skip)]
    pub secrets: Secrets,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Requests per minute per client IP; 0 disables rate limiting.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_top_k")]
    pub top_k: u64,
    #[serde(default = "default_vector_size")]
    pub vector_size: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Sliding-window bound on turns kept per session.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
}

#[derive(Debug, Default)]
pub struct Secrets {
    pub cohere_api_key: Option<Secret>,
    pub qdrant_api_key: Option<Secret>,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_rate_limit() -> u32 {
    120
}
fn default_max_body_size() -> usize {
    65_536
}
fn default_llm_base_url() -> String {
    "https://api.cohere.com".into()
}
fn default_model() -> String {
    "command-r".into()
}
fn default_embedding_model() -> String {
    "embed-english-light-v3.0".into()
}
fn default_temperature() -> f32 {
    0.4
}
fn default_max_tokens() -> u32 {
    500
}
fn default_max_retries() -> u32 {
    3
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}
fn default_collection() -> String {
    "medical_articles".into()
}
fn default_top_k() -> u64 {
    3
}
fn default_vector_size() -> u64 {
    384
}
fn default_max_turns() -> usize {
    64
}
fn default_max_sessions() -> usize {
    1024
}
fn default_idle_ttl_secs() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            rate_limit: default_rate_limit(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            collection: default_collection(),
            top_k: default_top_k(),
            vector_size: default_vector_size(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_sessions: default_max_sessions(),
            idle_ttl_secs: default_idle_ttl_secs(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<Self>(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("REMEDI_BIND") {
            self.server.bind = v;
        }
        if let Ok(v) = std::env::var("REMEDI_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.server.port = port;
            } else {
                tracing::warn!("ignoring invalid REMEDI_PORT value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REMEDI_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("REMEDI_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("REMEDI_QDRANT_URL") {
            self.index.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("REMEDI_INDEX_COLLECTION") {
            self.index.collection = v;
        }
        if let Ok(v) = std::env::var("REMEDI_COHERE_API_KEY") {
            self.secrets.cohere_api_key = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("REMEDI_QDRANT_API_KEY") {
            self.secrets.qdrant_api_key = Some(Secret::new(v));
        }
    }

    /// Reject configurations the service cannot meaningfully start with.
    ///
    /// # Errors
    ///
    /// Returns an error if the Cohere API key is missing or a fixed
    /// parameter is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.secrets.cohere_api_key.as_ref() {
            None => {
                return Err(ConfigError::Invalid(
                    "REMEDI_COHERE_API_KEY is not set".into(),
                ));
            }
            Some(key) if key.expose().trim().is_empty() => {
                return Err(ConfigError::Invalid(
                    "REMEDI_COHERE_API_KEY is empty".into(),
                ));
            }
            Some(_) => {}
        }
        if self.index.top_k == 0 {
            return Err(ConfigError::Invalid("index.top_k must be at least 1".into()));
        }
        if self.index.vector_size == 0 {
            return Err(ConfigError::Invalid(
                "index.vector_size must be at least 1".into(),
            ));
        }
        if !self.llm.temperature.is_finite() || !(0.0..=5.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(
                "llm.temperature must be within 0.0..=5.0".into(),
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "llm.max_tokens must be at least 1".into(),
            ));
        }
        if self.session.max_turns < 2 {
            return Err(ConfigError::Invalid(
                "session.max_turns must hold at least one exchange".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_key(mut config: Config) -> Config {
        config.secrets.cohere_api_key = Some(Secret::new("test-key"));
        config
    }

    #[test]
    fn defaults_match_fixed_parameters() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.index.top_k, 3);
        assert!((config.llm.temperature - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.llm.max_tokens, 500);
        assert_eq!(config.index.collection, "medical_articles");
    }

    #[test]
    fn load_nonexistent_path_uses_defaults() {
        let config = Config::load(Path::new("/does/not/exist.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn parses_partial_toml() {
        let toml = r#"
            [server]
            port = 9090

            [index]
            collection = "articles"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.index.collection, "articles");
        // Unspecified sections keep their defaults
        assert_eq!(config.index.top_k, 3);
        assert_eq!(config.llm.model, "command-r");
    }

    #[test]
    fn validate_rejects_missing_api_key() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("REMEDI_COHERE_API_KEY"));
    }

    #[test]
    fn validate_rejects_empty_api_key() {
        let mut config = Config::default();
        config.secrets.cohere_api_key = Some(Secret::new("  "));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults_with_key() {
        let config = with_key(Config::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_top_k() {
        let mut config = with_key(Config::default());
        config.index.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let mut config = with_key(Config::default());
        config.llm.temperature = 9.0;
        assert!(config.validate().is_err());
        config.llm.temperature = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_tiny_session_window() {
        let mut config = with_key(Config::default());
        config.session.max_turns = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_override_replaces_qdrant_url() {
        let mut config = Config::default();
        unsafe { std::env::set_var("REMEDI_QDRANT_URL", "http://qdrant.internal:6334") };
        config.apply_env_overrides();
        unsafe { std::env::remove_var("REMEDI_QDRANT_URL") };
        assert_eq!(config.index.qdrant_url, "http://qdrant.internal:6334");
    }

    #[test]
    fn env_override_ignores_invalid_port() {
        let mut config = Config::default();
        unsafe { std::env::set_var("REMEDI_PORT", "not-a-port") };
        config.apply_env_overrides();
        unsafe { std::env::remove_var("REMEDI_PORT") };
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret::new("co-api-key");
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(format!("{secret}"), "[REDACTED]");
        assert_eq!(secret.expose(), "co-api-key");
    }

    #[test]
    fn secrets_debug_never_leaks() {
        let mut config = Config::default();
        config.secrets.cohere_api_key = Some(Secret::new("co-api-key"));
        let debug = format!("{config:?}");
        assert!(!debug.contains("co-api-key"));
    }
}
