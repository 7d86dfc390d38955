//! Consulta Configuration Management
//!
//! Handles configuration from environment variables and config files.
//! Upstream credentials have no defaults and must be supplied explicitly;
//! everything else falls back to values that match the hosted deployment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default Hugging Face feature-extraction endpoint (all-MiniLM-L6-v2)
pub const DEFAULT_EMBEDDING_URL: &str = "https://api-inference.huggingface.co/pipeline/feature-extraction/sentence-transformers/all-MiniLM-L6-v2";

/// Default Groq chat-completions endpoint (OpenAI compatible)
pub const DEFAULT_COMPLETION_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Default completion model
pub const DEFAULT_COMPLETION_MODEL: &str = "llama-3.1-8b-instant";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Upstream service endpoints and credentials
    pub upstream: UpstreamConfig,

    /// Similarity search parameters
    pub retrieval: RetrievalConfig,

    /// Per-call timeouts
    pub timeouts: TimeoutConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// `from_env` is this with `std::env::var`; tests feed a map instead.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_lookup(&lookup)?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_lookup(&|key: &str| std::env::var(key).ok())?;
        Ok(self)
    }

    fn apply_lookup<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(host) = lookup("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("API_PORT") {
            self.server.port = parse_value("API_PORT", port)?;
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Vector store
        if let Some(url) = lookup("SUPABASE_URL") {
            self.upstream.supabase_url = Some(url);
        }
        if let Some(key) = lookup("SUPABASE_KEY") {
            self.upstream.supabase_key = Some(key);
        }

        // Embedding service
        if let Some(key) = lookup("HUGGINGFACE_KEY") {
            self.upstream.huggingface_key = Some(key);
        }
        if let Some(url) = lookup("EMBEDDING_URL") {
            self.upstream.embedding_url = url;
        }
        if let Some(wait) = lookup("EMBEDDING_WAIT_FOR_MODEL") {
            self.upstream.wait_for_model = parse_value("EMBEDDING_WAIT_FOR_MODEL", wait)?;
        }

        // Completion service
        if let Some(key) = lookup("GROQ_API_KEY") {
            self.upstream.groq_api_key = Some(key);
        }
        if let Some(url) = lookup("COMPLETION_URL") {
            self.upstream.completion_url = url;
        }
        if let Some(model) = lookup("COMPLETION_MODEL") {
            self.upstream.completion_model = model;
        }

        // Retrieval
        if let Some(threshold) = lookup("MATCH_THRESHOLD") {
            self.retrieval.match_threshold = parse_value("MATCH_THRESHOLD", threshold)?;
        }
        if let Some(count) = lookup("MATCH_COUNT") {
            self.retrieval.match_count = parse_value("MATCH_COUNT", count)?;
        }

        // Timeouts
        if let Some(secs) = lookup("EMBEDDING_TIMEOUT_SECS") {
            self.timeouts.embedding_timeout_secs = parse_value("EMBEDDING_TIMEOUT_SECS", secs)?;
        }
        if let Some(secs) = lookup("SEARCH_TIMEOUT_SECS") {
            self.timeouts.search_timeout_secs = parse_value("SEARCH_TIMEOUT_SECS", secs)?;
        }
        if let Some(secs) = lookup("COMPLETION_TIMEOUT_SECS") {
            self.timeouts.completion_timeout_secs = parse_value("COMPLETION_TIMEOUT_SECS", secs)?;
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("LOG_JSON") {
            self.logging.json_format = parse_value("LOG_JSON", json)?;
        }

        Ok(())
    }

    /// Check that every required field is present and every tunable is in range
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.upstream.supabase_url()?;
        self.upstream.supabase_key()?;
        self.upstream.huggingface_key()?;
        self.upstream.groq_api_key()?;
        self.retrieval.validate()?;
        self.timeouts.validate()?;
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS (empty means same-origin only)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: vec![],
        }
    }
}

/// Upstream service endpoints and credentials
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Supabase project URL
    pub supabase_url: Option<String>,

    /// Supabase API key
    pub supabase_key: Option<String>,

    /// Hugging Face inference API key
    pub huggingface_key: Option<String>,

    /// Feature-extraction endpoint
    pub embedding_url: String,

    /// Ask the inference API to wait for a cold model instead of returning 503
    pub wait_for_model: bool,

    /// Groq API key
    pub groq_api_key: Option<String>,

    /// Chat-completions endpoint
    pub completion_url: String,

    /// Model identifier sent with every completion request
    pub completion_model: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_key: None,
            huggingface_key: None,
            embedding_url: DEFAULT_EMBEDDING_URL.to_string(),
            wait_for_model: true,
            groq_api_key: None,
            completion_url: DEFAULT_COMPLETION_URL.to_string(),
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
        }
    }
}

impl UpstreamConfig {
    pub fn supabase_url(&self) -> Result<&str, ConfigError> {
        required("SUPABASE_URL", &self.supabase_url)
    }

    pub fn supabase_key(&self) -> Result<&str, ConfigError> {
        required("SUPABASE_KEY", &self.supabase_key)
    }

    pub fn huggingface_key(&self) -> Result<&str, ConfigError> {
        required("HUGGINGFACE_KEY", &self.huggingface_key)
    }

    pub fn groq_api_key(&self) -> Result<&str, ConfigError> {
        required("GROQ_API_KEY", &self.groq_api_key)
    }
}

fn required<'a>(key: &str, value: &'a Option<String>) -> Result<&'a str, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingRequired(key.to_string())),
    }
}

// Credentials never reach the logs.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "<redacted>"
            } else {
                "<unset>"
            }
        }

        f.debug_struct("UpstreamConfig")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_key", &redact(&self.supabase_key))
            .field("huggingface_key", &redact(&self.huggingface_key))
            .field("embedding_url", &self.embedding_url)
            .field("wait_for_model", &self.wait_for_model)
            .field("groq_api_key", &redact(&self.groq_api_key))
            .field("completion_url", &self.completion_url)
            .field("completion_model", &self.completion_model)
            .finish()
    }
}

/// Similarity search parameters sent with every `match_documents` call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Minimum similarity, in [0, 1]
    pub match_threshold: f32,

    /// Maximum number of documents
    pub match_count: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.5,
            match_count: 3,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "MATCH_THRESHOLD".to_string(),
                value: self.match_threshold.to_string(),
            });
        }
        if self.match_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MATCH_COUNT".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-call timeouts, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect timeout shared by all upstream clients
    pub connect_timeout_secs: u64,

    /// Embedding request deadline
    pub embedding_timeout_secs: u64,

    /// Vector search deadline
    pub search_timeout_secs: u64,

    /// Completion request deadline
    pub completion_timeout_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            embedding_timeout_secs: 30,
            search_timeout_secs: 10,
            completion_timeout_secs: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("CONNECT_TIMEOUT_SECS", self.connect_timeout_secs),
            ("EMBEDDING_TIMEOUT_SECS", self.embedding_timeout_secs),
            ("SEARCH_TIMEOUT_SECS", self.search_timeout_secs),
            ("COMPLETION_TIMEOUT_SECS", self.completion_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: "0".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
