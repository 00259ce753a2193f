//! Configuration management for Vitae services.
//!
//! Settings are read from a JSON config file (default `vitae.json` in the
//! working directory), with environment variables layered on top.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (VITAE_* prefix, plus `OPENROUTER_API_KEY`)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `VITAE_BIND_ADDRESS` → server.host
//! - `VITAE_PORT` → server.port
//! - `VITAE_RESUME_PATH` → resume_path
//! - `VITAE_DB_PATH` → storage.db_path
//! - `VITAE_LOG_LEVEL` → observability.log_level
//! - `OPENROUTER_API_KEY` → llm.api_key
//! - `VITAE_LLM_MODEL` → llm.model

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default config file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "vitae.json";

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP/WebSocket server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default: "127.0.0.1" (local only)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port number. Default: 8000
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

// ============================================================================
// LLM Provider Configuration
// ============================================================================

/// Settings for the upstream LLM completion API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenRouter API key (usually supplied via `OPENROUTER_API_KEY`)
    #[serde(default)]
    pub api_key: String,

    /// Base URL for the completion API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per call (1 initial + retries)
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,

    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
            temperature: default_llm_temperature(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}

fn default_llm_model() -> String {
    "anthropic/claude-3.5-sonnet".into()
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_llm_max_retries() -> u32 {
    3
}

fn default_llm_temperature() -> f64 {
    0.7
}

// ============================================================================
// Context Budget Configuration
// ============================================================================

/// Token budget settings for prompt assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum tokens for the whole prompt (system + history + question)
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Tokens reserved for the model's response
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: usize,

    /// Minimum recent exchanges (user + assistant pairs) pruning must keep
    #[serde(default = "default_min_exchanges")]
    pub min_exchanges: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            max_response_tokens: default_max_response_tokens(),
            min_exchanges: default_min_exchanges(),
        }
    }
}

fn default_max_context_tokens() -> usize {
    8000
}

fn default_max_response_tokens() -> usize {
    2000
}

fn default_min_exchanges() -> usize {
    2
}

// ============================================================================
// Admission Control Configuration
// ============================================================================

/// Per-session admission control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Questions allowed per session per minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_requests_per_minute() -> u32 {
    20
}

// ============================================================================
// Storage Configuration
// ============================================================================

/// Conversation store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "data/vitae.db".into()
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Settings
// ============================================================================

/// Application settings, constructed once at startup and passed by reference
/// into each component. There is no global settings lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// HTTP/WebSocket server
    #[serde(default)]
    pub server: ServerConfig,

    /// Path to the resume JSON document
    #[serde(default = "default_resume_path")]
    pub resume_path: String,

    /// LLM provider
    #[serde(default)]
    pub llm: LlmConfig,

    /// Token budgets
    #[serde(default)]
    pub context: ContextConfig,

    /// Admission control
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Conversation store
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_resume_path() -> String {
    "data/resume.json".into()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            resume_path: default_resume_path(),
            llm: LlmConfig::default(),
            context: ContextConfig::default(),
            limits: LimitsConfig::default(),
            storage: StorageConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from the default config file with env overrides applied.
    ///
    /// A missing config file is not an error; defaults are used.
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_from(Path::new(DEFAULT_CONFIG_PATH))?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Load settings from a specific config file (no env overrides).
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(settings)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("VITAE_BIND_ADDRESS") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("VITAE_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(path) = std::env::var("VITAE_RESUME_PATH") {
            self.resume_path = path;
        }
        if let Ok(path) = std::env::var("VITAE_DB_PATH") {
            self.storage.db_path = path;
        }
        if let Ok(level) = std::env::var("VITAE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            self.llm.api_key = key;
        }
        if let Ok(model) = std::env::var("VITAE_LLM_MODEL") {
            self.llm.model = model;
        }
    }

    /// Validate settings that would otherwise fail at an awkward time.
    pub fn validate(&self) -> Result<()> {
        if self.llm.max_retries == 0 {
            anyhow::bail!("llm.max_retries must be at least 1");
        }
        if self.llm.timeout_secs == 0 {
            anyhow::bail!("llm.timeout_secs must be positive");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!(
                "llm.temperature must be in 0.0..=2.0, got {}",
                self.llm.temperature
            );
        }
        if self.limits.requests_per_minute == 0 {
            anyhow::bail!("limits.requests_per_minute must be at least 1");
        }
        if self.context.max_context_tokens == 0 {
            anyhow::bail!("context.max_context_tokens must be positive");
        }
        if self.context.max_response_tokens == 0 {
            anyhow::bail!("context.max_response_tokens must be positive");
        }
        Ok(())
    }

    /// Socket address string for the server bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.llm.model, "anthropic/claude-3.5-sonnet");
        assert_eq!(settings.llm.max_retries, 3);
        assert_eq!(settings.context.max_context_tokens, 8000);
        assert_eq!(settings.context.min_exchanges, 2);
        assert_eq!(settings.limits.requests_per_minute, 20);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let settings = Settings::load_from(Path::new("/nonexistent/vitae.json")).unwrap();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.resume_path, "data/resume.json");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server": {{"port": 9000}}, "llm": {{"model": "test/model"}}}}"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.llm.model, "test/model");
        assert_eq!(settings.llm.timeout_secs, 60);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(Settings::load_from(file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut settings = Settings::default();
        settings.llm.max_retries = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_rate_limit() {
        let mut settings = Settings::default();
        settings.limits.requests_per_minute = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_temperature() {
        let mut settings = Settings::default();
        settings.llm.temperature = 3.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_bind_address() {
        let settings = Settings::default();
        assert_eq!(settings.bind_address(), "127.0.0.1:8000");
    }
}
