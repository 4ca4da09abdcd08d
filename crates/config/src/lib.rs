//! Configuration loading, validation, and management for Forgeline.
//!
//! Loads configuration from `~/.forgeline/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.forgeline/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// User id passed to the session store
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Provider used for the first attempt of every generation
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per backend response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Conversation memory window and daily reset
    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub usage: UsageConfig,
}

fn default_user_id() -> String {
    "local".into()
}
fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    8192
}

/// Redact a secret string for Debug output.
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
            .field("user_id", &self.user_id)
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("providers", &self.providers)
            .field("orchestrator", &self.orchestrator)
            .field("memory", &self.memory)
            .field("usage", &self.usage)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("context_budget", &self.context_budget)
            .field("system_reserve", &self.system_reserve)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Total estimated-token budget for system prompt, history and prompt
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,

    /// Tokens held back for the system prompt
    #[serde(default = "default_system_reserve")]
    pub system_reserve: usize,
}

fn default_context_budget() -> usize {
    32_000
}
fn default_system_reserve() -> usize {
    1_500
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            default_model: None,
            context_budget: default_context_budget(),
            system_reserve: default_system_reserve(),
        }
    }
}

/// Token budget of one provider, as seen by the truncator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderBudget {
    pub context_budget: usize,
    pub system_reserve: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Low-cost provider used when the primary runs out of quota or room
    #[serde(default = "default_fallback_provider")]
    pub fallback_provider: String,

    /// Fraction of the original budget used for the truncate-and-retry attempt
    #[serde(default = "default_retry_budget_ratio")]
    pub retry_budget_ratio: f32,

    /// Upper bound for the project exploration step
    #[serde(default = "default_exploration_timeout_secs")]
    pub exploration_timeout_secs: u64,

    /// Ask the backend to summarize an existing project before editing it
    #[serde(default)]
    pub multi_step: bool,

    /// Builder target: "html" yields a single document, anything else a project
    #[serde(default = "default_framework")]
    pub framework: String,

    /// Request extended reasoning from the backend
    #[serde(default)]
    pub reasoning: bool,
}

fn default_fallback_provider() -> String {
    "groq".into()
}
fn default_retry_budget_ratio() -> f32 {
    0.25
}
fn default_exploration_timeout_secs() -> u64 {
    15
}
fn default_framework() -> String {
    "html".into()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fallback_provider: default_fallback_provider(),
            retry_budget_ratio: default_retry_budget_ratio(),
            exploration_timeout_secs: default_exploration_timeout_secs(),
            multi_step: false,
            framework: default_framework(),
            reasoning: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Number of most recent messages kept
    #[serde(default = "default_window")]
    pub window: usize,

    /// Daily reset cutoff, local to `utc_offset_minutes`
    #[serde(default = "default_reset_hour")]
    pub reset_hour: u32,

    #[serde(default)]
    pub reset_minute: u32,

    /// Fixed timezone offset of the reset cutoff (420 = UTC+7)
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    /// How often an idle session checks the reset cutoff
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_window() -> usize {
    20
}
fn default_reset_hour() -> u32 {
    12
}
fn default_utc_offset_minutes() -> i32 {
    420
}
fn default_poll_interval_secs() -> u64 {
    60
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            reset_hour: default_reset_hour(),
            reset_minute: 0,
            utc_offset_minutes: default_utc_offset_minutes(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Generations allowed per UTC day; 0 disables the limit
    #[serde(default)]
    pub daily_limit: u32,
}

impl AppConfig {
    /// Load configuration from the default path (~/.forgeline/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `FORGELINE_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("FORGELINE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("FORGELINE_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("FORGELINE_MODEL") {
            config.default_model = model;
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
        dirs_home().join(".forgeline")
    }

    /// Directory where `/export` writes projects by default.
    pub fn projects_dir() -> PathBuf {
        Self::config_dir().join("projects")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let ratio = self.orchestrator.retry_budget_ratio;
        if ratio <= 0.0 || ratio >= 1.0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.retry_budget_ratio must be within (0.0, 1.0)".into(),
            ));
        }

        if self.memory.window == 0 {
            return Err(ConfigError::ValidationError(
                "memory.window must be at least 1".into(),
            ));
        }

        if self.memory.reset_hour > 23 || self.memory.reset_minute > 59 {
            return Err(ConfigError::ValidationError(
                "memory.reset_hour/reset_minute must form a valid time of day".into(),
            ));
        }

        if self.memory.utc_offset_minutes.abs() > 14 * 60 {
            return Err(ConfigError::ValidationError(
                "memory.utc_offset_minutes must be within ±840".into(),
            ));
        }

        for (name, provider) in &self.providers {
            if provider.system_reserve >= provider.context_budget {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{name}: system_reserve must be smaller than context_budget"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Budget for a provider; unconfigured providers get the defaults.
    pub fn provider_budget(&self, provider: &str) -> ProviderBudget {
        match self.providers.get(provider) {
            Some(p) => ProviderBudget {
                context_budget: p.context_budget,
                system_reserve: p.system_reserve,
            },
            None => ProviderBudget {
                context_budget: default_context_budget(),
                system_reserve: default_system_reserve(),
            },
        }
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            user_id: default_user_id(),
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            providers: HashMap::new(),
            orchestrator: OrchestratorConfig::default(),
            memory: MemoryConfig::default(),
            usage: UsageConfig::default(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openrouter");
        assert_eq!(config.orchestrator.fallback_provider, "groq");
        assert_eq!(config.memory.window, 20);
        assert_eq!(config.orchestrator.exploration_timeout_secs, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.memory.reset_hour, config.memory.reset_hour);
    }

    #[test]
    fn invalid_retry_ratio_rejected() {
        let mut config = AppConfig::default();
        config.orchestrator.retry_budget_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_reset_time_rejected() {
        let mut config = AppConfig::default();
        config.memory.reset_hour = 24;
        assert!(config.validate().is_err());
    }

    #[test]
    fn reserve_must_fit_budget() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "tiny".into(),
            ProviderConfig {
                context_budget: 100,
                system_reserve: 100,
                ..ProviderConfig::default()
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        let config = result.unwrap();
        assert_eq!(config.default_provider, "openrouter");
    }

    #[test]
    fn loads_provider_sections_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_provider = "anthropic"

[providers.anthropic]
api_url = "https://api.anthropic.com/v1"
context_budget = 100000

[orchestrator]
fallback_provider = "ollama"
multi_step = true

[memory]
reset_hour = 9
utc_offset_minutes = 0
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_provider, "anthropic");
        assert_eq!(config.provider_budget("anthropic").context_budget, 100_000);
        assert_eq!(config.provider_budget("anthropic").system_reserve, 1_500);
        assert_eq!(config.orchestrator.fallback_provider, "ollama");
        assert!(config.orchestrator.multi_step);
        assert_eq!(config.memory.reset_hour, 9);
        assert_eq!(config.memory.window, 20);
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_provider = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn unconfigured_provider_gets_default_budget() {
        let config = AppConfig::default();
        let budget = config.provider_budget("whatever");
        assert_eq!(budget.context_budget, 32_000);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter"));
        assert!(toml_str.contains("fallback_provider"));
    }
}
