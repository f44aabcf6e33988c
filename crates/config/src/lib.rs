//! Configuration loading, validation, and management for tinyRAG.
//!
//! Two layers live here:
//! - [`AppConfig`]: process configuration from `~/.tinyrag/config.toml` with
//!   environment variable overrides. Validated at startup.
//! - [`settings::SettingsStore`]: the user-editable `settings.json` (backend
//!   endpoint, models, personas, custom APIs, execution flags) that the HTTP
//!   API mutates at runtime.

pub mod settings;

pub use settings::{
    CustomApi, DEFAULT_PERSONA_ID, Persona, QUERY_PLACEHOLDER, Settings, SettingsStore, normalize_base_url,
    write_atomic,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.tinyrag/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// File locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// First-run defaults written into `settings.json`
    #[serde(default)]
    pub backend: BackendDefaults,

    /// Retrieval policy parameters
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Tool execution limits
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted request body in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    8 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file. Empty keeps chunks in memory only.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_settings_path")]
    pub settings_path: String,

    /// Persisted chats. Empty keeps chats in memory only.
    #[serde(default = "default_chats_path")]
    pub chats_path: String,
}

fn default_db_path() -> String {
    AppConfig::config_dir().join("tinyrag.db").display().to_string()
}
fn default_settings_path() -> String {
    AppConfig::config_dir().join("settings.json").display().to_string()
}
fn default_chats_path() -> String {
    AppConfig::config_dir().join("chats.json").display().to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            settings_path: default_settings_path(),
            chats_path: default_chats_path(),
        }
    }
}

/// Values used to create `settings.json` when it does not exist yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendDefaults {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    #[serde(default = "default_lang")]
    pub lang: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_k")]
    pub k: usize,

    /// Timeout for non-streaming backend requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:1234".into()
}
fn default_chat_model() -> String {
    "mistralai/ministral-3-14b-reasoning".into()
}
fn default_embed_model() -> String {
    "text-embedding-nomic-embed-text-v1.5".into()
}
fn default_lang() -> String {
    "de".into()
}
fn default_chunk_size() -> usize {
    800
}
fn default_k() -> usize {
    5
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for BackendDefaults {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embed_model: default_embed_model(),
            lang: default_lang(),
            chunk_size: default_chunk_size(),
            k: default_k(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Thresholds and limits of the adaptive retrieval procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// A hit scoring strictly above this skips arbitration
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f32,

    /// Minimum score when arbitration fails
    #[serde(default = "default_relaxed_threshold")]
    pub relaxed_threshold: f32,

    /// Threshold when arbitration asks for more without naming one
    #[serde(default = "default_relaxed_threshold")]
    pub requested_threshold: f32,

    /// Minimum score for `/api/search` primary hits
    #[serde(default = "default_relaxed_threshold")]
    pub search_threshold: f32,

    #[serde(default = "default_candidate_floor")]
    pub candidate_floor: usize,

    #[serde(default = "default_candidate_cap")]
    pub candidate_cap: usize,

    /// Candidates summarised for the arbitration prompt
    #[serde(default = "default_summary_size")]
    pub summary_size: usize,

    #[serde(default = "default_embed_batch")]
    pub embed_batch: usize,

    #[serde(default = "default_deep_min_k")]
    pub deep_min_k: usize,

    #[serde(default = "default_deep_max_k")]
    pub deep_max_k: usize,

    /// Prior turns sent along with a new question
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// System prompt length (chars) above which the context is cut
    #[serde(default = "default_prompt_ceiling")]
    pub prompt_ceiling: usize,

    /// Context length (chars) kept when cutting
    #[serde(default = "default_truncated_context")]
    pub truncated_context: usize,
}

fn default_high_confidence() -> f32 {
    0.90
}
fn default_relaxed_threshold() -> f32 {
    0.60
}
fn default_candidate_floor() -> usize {
    100
}
fn default_candidate_cap() -> usize {
    1000
}
fn default_summary_size() -> usize {
    5
}
fn default_embed_batch() -> usize {
    16
}
fn default_deep_min_k() -> usize {
    10
}
fn default_deep_max_k() -> usize {
    50
}
fn default_history_turns() -> usize {
    10
}
fn default_prompt_ceiling() -> usize {
    32_000
}
fn default_truncated_context() -> usize {
    5_000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            high_confidence: default_high_confidence(),
            relaxed_threshold: default_relaxed_threshold(),
            requested_threshold: default_relaxed_threshold(),
            search_threshold: default_relaxed_threshold(),
            candidate_floor: default_candidate_floor(),
            candidate_cap: default_candidate_cap(),
            summary_size: default_summary_size(),
            embed_batch: default_embed_batch(),
            deep_min_k: default_deep_min_k(),
            deep_max_k: default_deep_max_k(),
            history_turns: default_history_turns(),
            prompt_ceiling: default_prompt_ceiling(),
            truncated_context: default_truncated_context(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Wall-clock limit for sandboxed interpretation
    #[serde(default = "default_sandbox_timeout")]
    pub sandbox_timeout_secs: u64,

    /// Evaluation steps a sandboxed script may take
    #[serde(default = "default_sandbox_fuel")]
    pub sandbox_fuel: u64,

    /// Timeout for lookups and template APIs
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_sandbox_timeout() -> u64 {
    5
}
fn default_sandbox_fuel() -> u64 {
    1_000_000
}
fn default_http_timeout() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            sandbox_timeout_secs: default_sandbox_timeout(),
            sandbox_fuel: default_sandbox_fuel(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tinyrag/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `TINYRAG_HOST`, `TINYRAG_PORT`
    /// - `TINYRAG_DB`, `TINYRAG_SETTINGS`, `TINYRAG_CHATS`
    /// - `TINYRAG_BASE_URL`, `TINYRAG_CHAT_MODEL`, `TINYRAG_EMBED_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("TINYRAG_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("TINYRAG_PORT") {
            self.server.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("TINYRAG_PORT is not a port: {port}"))
            })?;
        }
        if let Some(db) = lookup("TINYRAG_DB") {
            self.storage.db_path = db;
        }
        if let Some(settings) = lookup("TINYRAG_SETTINGS") {
            self.storage.settings_path = settings;
        }
        if let Some(chats) = lookup("TINYRAG_CHATS") {
            self.storage.chats_path = chats;
        }
        if let Some(url) = lookup("TINYRAG_BASE_URL") {
            self.backend.base_url = url;
        }
        if let Some(model) = lookup("TINYRAG_CHAT_MODEL") {
            self.backend.chat_model = model;
        }
        if let Some(model) = lookup("TINYRAG_EMBED_MODEL") {
            self.backend.embed_model = model;
        }
        Ok(())
    }

    /// Timeout for non-streaming backend requests.
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.backend.request_timeout_secs)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tinyrag")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        for (name, value) in [
            ("high_confidence", r.high_confidence),
            ("relaxed_threshold", r.relaxed_threshold),
            ("requested_threshold", r.requested_threshold),
            ("search_threshold", r.search_threshold),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "retrieval.{name} must be between -1.0 and 1.0"
                )));
            }
        }
        if r.relaxed_threshold > r.high_confidence {
            return Err(ConfigError::ValidationError(
                "retrieval.relaxed_threshold must not exceed retrieval.high_confidence".into(),
            ));
        }
        if r.candidate_floor == 0 || r.candidate_floor > r.candidate_cap {
            return Err(ConfigError::ValidationError(
                "retrieval.candidate_floor must be in 1..=candidate_cap".into(),
            ));
        }
        if r.embed_batch == 0 {
            return Err(ConfigError::ValidationError("retrieval.embed_batch must be > 0".into()));
        }
        if r.deep_min_k > r.deep_max_k {
            return Err(ConfigError::ValidationError(
                "retrieval.deep_min_k must not exceed retrieval.deep_max_k".into(),
            ));
        }
        if self.tools.sandbox_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.sandbox_timeout_secs must be > 0".into(),
            ));
        }
        if self.backend.chunk_size == 0 || self.backend.k == 0 {
            return Err(ConfigError::ValidationError(
                "backend.chunk_size and backend.k must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// First-run settings derived from `[backend]`.
    pub fn default_settings(&self) -> Settings {
        Settings::from_defaults(&self.backend)
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.backend.base_url, "http://localhost:1234");
        assert!((config.retrieval.high_confidence - 0.90).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.retrieval, config.retrieval);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
[retrieval]
high_confidence = 0.8

[tools]
sandbox_timeout_secs = 2
"#,
        )
        .unwrap();
        assert!((parsed.retrieval.high_confidence - 0.8).abs() < f32::EPSILON);
        assert_eq!(parsed.retrieval.candidate_floor, 100);
        assert_eq!(parsed.tools.sandbox_timeout_secs, 2);
        assert_eq!(parsed.backend.k, 5);
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.relaxed_threshold = 0.95;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_batch_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.embed_batch = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn invalid_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TINYRAG_PORT", "9090"),
            ("TINYRAG_BASE_URL", "http://localhost:11434"),
            ("TINYRAG_DB", ""),
        ]);
        let mut config = AppConfig::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.backend.base_url, "http://localhost:11434");
        assert!(config.storage.db_path.is_empty());
    }

    #[test]
    fn bad_port_override_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|k| (k == "TINYRAG_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("8080"));
        assert!(toml_str.contains("high_confidence"));
    }
}
