//! Configuration loading, validation, and management for streamgram.
//!
//! Loads configuration from `~/.streamgram/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.streamgram/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion endpoint settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Telegram Bot API settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Streaming renderer settings
    #[serde(default)]
    pub render: RenderConfig,

    /// Conversation loop settings
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// History store settings
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_telegram_api_base(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Maximum characters of reply text per outbound page
    #[serde(default = "default_page_capacity")]
    pub page_capacity: usize,

    /// Minimum unsent characters before another edit is issued
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Characters a page may be cut after
    #[serde(default = "default_cut_chars")]
    pub cut_chars: String,
}

fn default_page_capacity() -> usize {
    2000
}
fn default_flush_threshold() -> usize {
    200
}
fn default_cut_chars() -> String {
    "\n \t".into()
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            page_capacity: default_page_capacity(),
            flush_threshold: default_flush_threshold(),
            cut_chars: default_cut_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Completion rounds allowed per user message
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Whether tool schemas are offered to the model by default
    #[serde(default)]
    pub enable_tools: bool,

    /// System prompt for new conversations. `{user}` is replaced with the
    /// sender's description.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_max_attempts() -> u32 {
    10
}
fn default_system_prompt() -> String {
    concat!(
        "- User: {user}\n",
        "- Prefer the output in HTML instead of markdown, use these tags: ",
        "<b/>(<strong/>), <i/>(<em/>), <code/>, <s/>(<strike/>, <del/>), <pre>code</pre>; ",
        "NO <p> is needed, nor <br/> tags, just plain text with the tags above.\n",
        "- Escape literal < and > characters in the output.\n",
    )
    .into()
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            enable_tools: false,
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// "memory" or "file"
    #[serde(default = "default_history_backend")]
    pub backend: String,

    /// File location for the "file" backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_history_backend() -> String {
    "file".into()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: default_history_backend(),
            path: None,
        }
    }
}

impl HistoryConfig {
    /// The configured path, or `~/.streamgram/history.json`.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("history.json"))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.streamgram/config.toml).
    ///
    /// Environment variables take priority over the file:
    /// - `STREAMGRAM_API_KEY`, then `OPENAI_API_KEY`
    /// - `STREAMGRAM_API_URL`
    /// - `STREAMGRAM_MODEL`
    /// - `TELEGRAM_TOKEN`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
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

    /// Apply environment overrides using `lookup` to read variables.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("STREAMGRAM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = lookup("STREAMGRAM_API_URL") {
            self.provider.api_url = url;
        }
        if let Some(model) = lookup("STREAMGRAM_MODEL") {
            self.provider.default_model = model;
        }
        if let Some(token) = lookup("TELEGRAM_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".streamgram")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.render.page_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "render.page_capacity must be at least 1".into(),
            ));
        }
        if self.render.flush_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "render.flush_threshold must be at least 1".into(),
            ));
        }
        if self.render.cut_chars.is_empty() {
            return Err(ConfigError::ValidationError(
                "render.cut_chars must not be empty".into(),
            ));
        }
        if self.conversation.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "conversation.max_attempts must be at least 1".into(),
            ));
        }
        if !matches!(self.history.backend.as_str(), "memory" | "file") {
            return Err(ConfigError::ValidationError(format!(
                "unknown history backend '{}', expected 'memory' or 'file'",
                self.history.backend
            )));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
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
