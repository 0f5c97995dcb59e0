// Configuration File Support
//
// TOML configuration for the recipe gate with environment variable overrides.
// Configuration files are loaded from the XDG config directory:
// ~/.config/recipe-gate/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::compliance::{ComplianceConfig, DayBoundary};
use crate::extraction::RetryPolicy;

/// Prefix shared by every environment override
const ENV_PREFIX: &str = "RECIPE_GATE_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Admission control limits
    pub compliance: ComplianceConfig,

    /// Retry policy for failed attempts
    pub retry: RetryPolicy,

    /// Page fetcher settings
    pub fetch: FetchConfig,

    /// Usage history kept between runs
    pub state: StateConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Page fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// User-Agent sent with every request
    pub user_agent: String,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,

    /// Time budget for one gated attempt in seconds
    pub attempt_timeout_secs: u64,

    /// Pause before each request in milliseconds
    pub courtesy_delay_ms: u64,

    /// Hosts recipe URLs may point at
    pub allowed_hosts: Vec<String>,

    /// Path prefix of recipe pages
    pub recipe_path_prefix: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Recipe Gate/0.1 (Educational Use)".to_string(),
            request_timeout_secs: 30,
            attempt_timeout_secs: 45,
            courtesy_delay_ms: 0,
            allowed_hosts: vec!["cooking.nytimes.com".to_string()],
            recipe_path_prefix: "/recipes/".to_string(),
        }
    }
}

/// Usage history persistence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StateConfig {
    /// Keep usage events between runs
    pub persist: bool,

    /// Usage file; defaults to the XDG data directory
    pub usage_file: Option<PathBuf>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            persist: true,
            usage_file: None,
        }
    }
}

impl StateConfig {
    /// Resolved usage file location
    ///
    /// Returns `~/.local/share/recipe-gate/usage.json` on Linux unless
    /// `usage_file` is set.
    pub fn usage_path(&self) -> PathBuf {
        if let Some(path) = &self.usage_file {
            return path.clone();
        }
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "recipe-gate", "RecipeGate")
        {
            proj_dirs.data_dir().join("usage.json")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("recipe-gate")
                .join("usage.json")
        }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(Self::config_path())
    }

    /// Load configuration from a specific path
    ///
    /// Missing files fall back to defaults. Environment overrides are
    /// applied either way, then the result is validated.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/recipe-gate/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "recipe-gate", "RecipeGate")
        {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("recipe-gate")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// - RECIPE_GATE_LOG_LEVEL
    /// - RECIPE_GATE_LOG_FORMAT
    /// - RECIPE_GATE_DAILY_LIMIT
    /// - RECIPE_GATE_PER_MINUTE_LIMIT
    /// - RECIPE_GATE_MIN_SPACING_MS
    /// - RECIPE_GATE_DAY_BOUNDARY (rolling, calendar)
    /// - RECIPE_GATE_MAX_ATTEMPTS
    /// - RECIPE_GATE_USER_AGENT
    /// - RECIPE_GATE_USAGE_FILE
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok())
    }

    /// Apply overrides from `lookup`, keyed by variable name without prefix
    ///
    /// Unparseable or zero values are ignored.
    fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(limit) = lookup("DAILY_LIMIT").and_then(|v| v.parse::<u32>().ok()) {
            if limit > 0 {
                self.compliance.daily_limit = limit;
            }
        }
        if let Some(limit) = lookup("PER_MINUTE_LIMIT").and_then(|v| v.parse::<u32>().ok()) {
            if limit > 0 {
                self.compliance.per_minute_limit = limit;
            }
        }
        if let Some(spacing) = lookup("MIN_SPACING_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.compliance.min_spacing_ms = spacing;
        }
        if let Some(boundary) = lookup("DAY_BOUNDARY") {
            match boundary.to_lowercase().as_str() {
                "rolling" => self.compliance.day_boundary = DayBoundary::Rolling,
                "calendar" => self.compliance.day_boundary = DayBoundary::Calendar,
                other => tracing::warn!("Ignoring unknown day boundary: {}", other),
            }
        }

        if let Some(attempts) = lookup("MAX_ATTEMPTS").and_then(|v| v.parse::<u32>().ok()) {
            if attempts > 0 {
                self.retry.max_attempts = attempts;
            }
        }

        if let Some(agent) = lookup("USER_AGENT") {
            if !agent.trim().is_empty() {
                self.fetch.user_agent = agent;
            }
        }

        if let Some(file) = lookup("USAGE_FILE") {
            if !file.trim().is_empty() {
                self.state.usage_file = Some(PathBuf::from(file));
            }
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.compliance
            .validate()
            .context("Invalid [compliance] section")?;
        self.retry.validate().context("Invalid [retry] section")?;

        if self.fetch.user_agent.trim().is_empty() {
            anyhow::bail!("fetch.user_agent must not be empty");
        }
        if self.fetch.request_timeout_secs == 0 {
            anyhow::bail!("fetch.request_timeout_secs must be > 0");
        }
        if self.fetch.attempt_timeout_secs == 0 {
            anyhow::bail!("fetch.attempt_timeout_secs must be > 0");
        }
        if self.fetch.allowed_hosts.is_empty() {
            anyhow::bail!("fetch.allowed_hosts must list at least one host");
        }
        if !self.fetch.recipe_path_prefix.starts_with('/') {
            anyhow::bail!(
                "fetch.recipe_path_prefix must start with '/', got {}",
                self.fetch.recipe_path_prefix
            );
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
