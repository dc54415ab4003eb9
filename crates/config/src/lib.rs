//! Configuration loading, validation, and management for BlueChat.
//!
//! Loads configuration from `~/.bluechat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.bluechat/config.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Admission and validation limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Knowledge document location
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Generation backend selection and settings
    #[serde(default)]
    pub backend: BackendConfig,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on a single backend call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// How often idle clients are evicted from the rate-limit table.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Send permissive CORS headers (the chat page may be served elsewhere).
    #[serde(default = "default_true")]
    pub cors: bool,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    7860
}
fn default_request_timeout() -> u64 {
    45
}
fn default_max_body_bytes() -> usize {
    64 * 1024
}
fn default_sweep_interval() -> u64 {
    300
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
            sweep_interval_secs: default_sweep_interval(),
            cors: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_per_minute")]
    pub requests_per_minute: usize,

    #[serde(default = "default_per_hour")]
    pub requests_per_hour: usize,

    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Tracked-client count that triggers an inline idle sweep.
    #[serde(default = "default_max_tracked_clients")]
    pub max_tracked_clients: usize,

    /// Case-insensitive phrases that reject a message outright.
    #[serde(default = "default_blocked_phrases")]
    pub blocked_phrases: Vec<String>,
}

fn default_per_minute() -> usize {
    10
}
fn default_per_hour() -> usize {
    100
}
fn default_max_messages() -> usize {
    10
}
fn default_max_message_chars() -> usize {
    1000
}
fn default_max_tracked_clients() -> usize {
    10_000
}

/// Built-in abuse markers: prompt-override phrases (English and Spanish),
/// credential-exfiltration probes, and chat-template delimiters.
pub fn default_blocked_phrases() -> Vec<String> {
    [
        "ignore previous",
        "ignore all previous",
        "ignore your instructions",
        "disregard previous",
        "forget your instructions",
        "ignora las instrucciones",
        "olvida tus instrucciones",
        "reveal your system prompt",
        "developer mode",
        "jailbreak",
        "api_key",
        "groq_api_key",
        "process.env",
        "os.environ",
        "<|im_start|>",
        "<|im_end|>",
        "<|endoftext|>",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_per_minute(),
            requests_per_hour: default_per_hour(),
            max_messages: default_max_messages(),
            max_message_chars: default_max_message_chars(),
            max_tracked_clients: default_max_tracked_clients(),
            blocked_phrases: default_blocked_phrases(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Path to the knowledge document (JSON array of entries).
    #[serde(default = "default_knowledge_path")]
    pub path: PathBuf,
}

fn default_knowledge_path() -> PathBuf {
    PathBuf::from("qa-data").join("bluebook.json")
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: default_knowledge_path(),
        }
    }
}

/// Which generation engine serves chat requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hosted OpenAI-compatible completion API
    #[default]
    Remote,
    /// GGUF model loaded in-process (requires the `local` feature)
    Local,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(ConfigError::ValidationError(format!(
                "unknown backend kind '{other}' (expected 'remote' or 'local')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub local: LocalConfig,
}

impl BackendConfig {
    /// Provenance name of the selected backend.
    pub fn active_name(&self) -> &str {
        match self.kind {
            BackendKind::Remote => &self.remote.name,
            BackendKind::Local => &self.local.name,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_name")]
    pub name: String,

    #[serde(default = "default_remote_url")]
    pub api_url: String,

    #[serde(default = "default_remote_model")]
    pub model: String,

    #[serde(default = "default_remote_max_tokens")]
    pub max_tokens: u32,

    /// How many trailing messages are forwarded upstream.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Bearer credential. Normally supplied through the environment.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_remote_name() -> String {
    "qwen-general".into()
}
fn default_remote_url() -> String {
    "https://api.groq.com/openai/v1".into()
}
fn default_remote_model() -> String {
    "llama3-8b-8192".into()
}
fn default_remote_max_tokens() -> u32 {
    500
}
fn default_history_window() -> usize {
    5
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            name: default_remote_name(),
            api_url: default_remote_url(),
            model: default_remote_model(),
            max_tokens: default_remote_max_tokens(),
            history_window: default_history_window(),
            api_key: None,
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("history_window", &self.history_window)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_local_name")]
    pub name: String,

    /// Preset alias (e.g. "qwen:1.5b") or a path to a `.gguf` file.
    #[serde(default = "default_local_model")]
    pub model: String,

    #[serde(default = "default_local_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_top_p")]
    pub top_p: f64,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_local_name() -> String {
    "qwen-local".into()
}
fn default_local_model() -> String {
    "qwen:1.5b".into()
}
fn default_local_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f64 {
    0.7
}
fn default_top_p() -> f64 {
    0.9
}
fn default_seed() -> u64 {
    42
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            name: default_local_name(),
            model: default_local_model(),
            max_tokens: default_local_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            seed: default_seed(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.bluechat/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `GROQ_API_KEY` / `BLUECHAT_API_KEY`: remote backend credential
    /// - `BLUECHAT_BACKEND`: `remote` or `local`
    /// - `BLUECHAT_MODEL`: model of the selected backend
    /// - `BLUECHAT_PORT`
    /// - `BLUECHAT_KNOWLEDGE_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load from `path`, then apply environment overrides and validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
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

    /// Apply overrides from an environment lookup function.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("BLUECHAT_API_KEY").or_else(|| non_empty("GROQ_API_KEY")) {
            self.backend.remote.api_key = Some(key);
        }

        if let Some(kind) = non_empty("BLUECHAT_BACKEND") {
            self.backend.kind = kind.parse()?;
        }

        if let Some(model) = non_empty("BLUECHAT_MODEL") {
            match self.backend.kind {
                BackendKind::Remote => self.backend.remote.model = model,
                BackendKind::Local => self.backend.local.model = model,
            }
        }

        if let Some(port) = non_empty("BLUECHAT_PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("BLUECHAT_PORT is not a valid port: {port}"))
            })?;
        }

        if let Some(path) = non_empty("BLUECHAT_KNOWLEDGE_PATH") {
            self.knowledge.path = PathBuf::from(path);
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".bluechat")
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        if limits.requests_per_minute == 0 || limits.requests_per_hour == 0 {
            return Err(ConfigError::ValidationError(
                "rate limits must be greater than 0".into(),
            ));
        }

        if limits.max_messages == 0 || limits.max_message_chars == 0 {
            return Err(ConfigError::ValidationError(
                "max_messages and max_message_chars must be greater than 0".into(),
            ));
        }

        if self.gateway.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.gateway.sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "sweep_interval_secs must be greater than 0".into(),
            ));
        }

        if self.gateway.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_body_bytes must be greater than 0".into(),
            ));
        }

        let local = &self.backend.local;
        if !(0.0..=2.0).contains(&local.temperature) {
            return Err(ConfigError::ValidationError(
                "local temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if local.top_p <= 0.0 || local.top_p > 1.0 {
            return Err(ConfigError::ValidationError(
                "local top_p must be in (0.0, 1.0]".into(),
            ));
        }

        if self.backend.remote.history_window == 0 {
            return Err(ConfigError::ValidationError(
                "remote history_window must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if a remote credential is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.backend.remote.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
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

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.port, 7860);
        assert_eq!(config.limits.requests_per_minute, 10);
        assert_eq!(config.limits.requests_per_hour, 100);
        assert_eq!(config.limits.max_messages, 10);
        assert_eq!(config.limits.max_message_chars, 1000);
        assert_eq!(config.backend.kind, BackendKind::Remote);
        assert_eq!(config.backend.remote.history_window, 5);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.limits.blocked_phrases, config.limits.blocked_phrases);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let toml_str = r#"
[limits]
requests_per_minute = 3

[backend]
kind = "local"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.limits.requests_per_minute, 3);
        assert_eq!(config.limits.requests_per_hour, 100);
        assert_eq!(config.backend.kind, BackendKind::Local);
        assert_eq!(config.backend.active_name(), "qwen-local");
    }

    #[test]
    fn zero_limits_rejected() {
        let mut config = AppConfig::default();
        config.limits.requests_per_minute = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_sweep_interval_rejected() {
        let mut config = AppConfig::default();
        config.gateway.sweep_interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("sweep_interval_secs")
        ));

        let mut config = AppConfig::default();
        config.gateway.max_body_bytes = 0;
        assert!(config.validate().is_err());

        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_sampling_rejected() {
        let mut config = AppConfig::default();
        config.backend.local.temperature = 5.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.backend.local.top_p = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.gateway.port, 7860);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway]\nport = 9000\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.gateway.port, 9000);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway\nport = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_supplies_credential() {
        let mut config = AppConfig::default();
        config
            .apply_env(env_of(&[("GROQ_API_KEY", "gsk_test")]))
            .unwrap();
        assert_eq!(config.backend.remote.api_key.as_deref(), Some("gsk_test"));
        assert!(config.has_api_key());
    }

    #[test]
    fn blank_credential_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env_of(&[("GROQ_API_KEY", "  ")])).unwrap();
        assert!(!config.has_api_key());
    }

    #[test]
    fn env_model_targets_selected_backend() {
        let mut config = AppConfig::default();
        config
            .apply_env(env_of(&[
                ("BLUECHAT_BACKEND", "local"),
                ("BLUECHAT_MODEL", "/models/qwen.gguf"),
                ("BLUECHAT_PORT", "8080"),
            ]))
            .unwrap();
        assert_eq!(config.backend.kind, BackendKind::Local);
        assert_eq!(config.backend.local.model, "/models/qwen.gguf");
        assert_eq!(config.backend.remote.model, "llama3-8b-8192");
        assert_eq!(config.gateway.port, 8080);
    }

    #[test]
    fn unknown_backend_kind_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env(env_of(&[("BLUECHAT_BACKEND", "quantum")]));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn credential_never_serialized_or_debug_printed() {
        let mut config = AppConfig::default();
        config.backend.remote.api_key = Some("gsk_very_secret".into());

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(!toml_str.contains("gsk_very_secret"));

        let debug = format!("{config:?}");
        assert!(!debug.contains("gsk_very_secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("7860"));
        assert!(toml_str.contains("api.groq.com"));
    }
}
