//! Configuration loading, validation, and management for Attaché.
//!
//! Loads configuration from `~/.attache/config.toml` with environment
//! variable overrides, validated once at startup. The two required values
//! — the agent API key and the recipient address — are enumerated by
//! `missing_required()` so the entry point can refuse to run with a
//! complete list rather than failing on the first lookup.
//!
//! SMTP transport settings are deliberately NOT here: the send_email tool
//! resolves them from the environment at execution time, so a missing SMTP
//! host degrades that one tool instead of blocking the whole run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the agent API key.
pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";
/// Environment variable holding the summary recipient address.
pub const ENV_RECIPIENT: &str = "RECIPIENT_EMAIL";

/// The root configuration structure.
///
/// Maps directly to `~/.attache/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agent API key (usually from the environment, not the file)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Where the summary email goes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,

    /// Model driving the assistant
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// How many days ahead to look for calendar events and due tasks
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Calendar credential locations
    #[serde(default)]
    pub calendar: CalendarConfig,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_window_days() -> u32 {
    5
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("recipient_email", &self.recipient_email)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("window_days", &self.window_days)
            .field("calendar", &self.calendar)
            .finish()
    }
}

/// Where the calendar client finds its credential material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Provisioned OAuth client-secret document
    pub credentials_file: PathBuf,

    /// Persisted token (rewritten after each refresh/reauthorization)
    pub token_file: PathBuf,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            credentials_file: AppConfig::config_dir().join("credentials.json"),
            token_file: AppConfig::config_dir().join("token.json"),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.attache/config.toml),
    /// then apply environment variable overrides:
    /// - `ANTHROPIC_API_KEY`
    /// - `RECIPIENT_EMAIL`
    /// - `ATTACHE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(key) = std::env::var(ENV_API_KEY) {
            config.api_key = Some(key);
        }
        if let Ok(recipient) = std::env::var(ENV_RECIPIENT) {
            config.recipient_email = Some(recipient);
        }
        if let Ok(model) = std::env::var("ATTACHE_MODEL") {
            config.model = model;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".attache")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.window_days < 1 {
            return Err(ConfigError::ValidationError(
                "window_days must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Enumerate the required values that are absent, by their environment
    /// names. The run must not start (and must perform no side effect)
    /// while this is non-empty.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.is_none() {
            missing.push(ENV_API_KEY);
        }
        if self.recipient_email.is_none() {
            missing.push(ENV_RECIPIENT);
        }
        missing
    }

    /// Generate a default config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            recipient_email: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            window_days: default_window_days(),
            calendar: CalendarConfig::default(),
        }
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
