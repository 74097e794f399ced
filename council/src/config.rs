//! Council configuration
//!
//! One explicit `CouncilConfig` is threaded through pipeline, team and
//! agent construction. It can be built from defaults, a TOML file, or
//! environment overrides layered on top of either.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::VoteFallback;

/// Default Ollama endpoint
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default model pool when none is configured
pub const DEFAULT_MODEL: &str = "qwen2.5:32b";

/// Error type for configuration loading and validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Text-generation service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the Ollama-compatible service
    pub base_url: String,
    /// Model pool; agents are assigned round-robin over this list
    pub models: Vec<String>,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            models: vec![DEFAULT_MODEL.to_string()],
            request_timeout_secs: 600,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Consensus engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of agents per team
    pub team_size: usize,
    /// Characters of each candidate shown in a vote prompt
    pub preview_chars: usize,
    /// Upper bound on any single agent call, in seconds
    pub call_timeout_secs: u64,
    /// What to do with a vote that cannot be honoured.
    ///
    /// Defaults to [`VoteFallback::Abstain`], under which a round's tally
    /// sums to the live voters minus its abstentions. Use
    /// [`VoteFallback::Random`] when every live voter must land exactly one
    /// vote.
    pub vote_fallback: VoteFallback,
    /// Seed for tie-breaks and random fallback; entropy when unset
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            team_size: 6,
            preview_chars: 500,
            call_timeout_secs: 300,
            vote_fallback: VoteFallback::Abstain,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    pub backend: BackendConfig,
    pub engine: EngineConfig,
}

impl CouncilConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: CouncilConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `COUNCIL_*` overrides read through `lookup`.
    ///
    /// Takes a lookup function so overrides can be exercised without
    /// touching the process environment.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("COUNCIL_BASE_URL") {
            self.backend.base_url = url;
        }
        if let Some(models) = lookup("COUNCIL_MODELS") {
            self.backend.models = models
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(val) = lookup("COUNCIL_REQUEST_TIMEOUT_SECS") {
            self.backend.request_timeout_secs = parse_env("COUNCIL_REQUEST_TIMEOUT_SECS", val)?;
        }
        if let Some(val) = lookup("COUNCIL_TEAM_SIZE") {
            self.engine.team_size = parse_env("COUNCIL_TEAM_SIZE", val)?;
        }
        if let Some(val) = lookup("COUNCIL_CALL_TIMEOUT_SECS") {
            self.engine.call_timeout_secs = parse_env("COUNCIL_CALL_TIMEOUT_SECS", val)?;
        }
        if let Some(val) = lookup("COUNCIL_VOTE_FALLBACK") {
            self.engine.vote_fallback = match val.to_lowercase().as_str() {
                "abstain" => VoteFallback::Abstain,
                "random" => VoteFallback::Random,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: "COUNCIL_VOTE_FALLBACK",
                        value: val,
                    })
                }
            };
        }
        if let Some(val) = lookup("COUNCIL_SEED") {
            self.engine.seed = Some(parse_env("COUNCIL_SEED", val)?);
        }
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        if self.engine.team_size == 0 {
            return Err(ConfigError::Invalid("team_size must be at least 1".into()));
        }
        if self.engine.preview_chars == 0 {
            return Err(ConfigError::Invalid("preview_chars must be positive".into()));
        }
        if self.engine.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "call_timeout_secs must be positive".into(),
            ));
        }
        if self.backend.models.is_empty() {
            return Err(ConfigError::Invalid("at least one model is required".into()));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url is empty".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}
