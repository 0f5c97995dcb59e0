//! Compliance Configuration
//!
//! Usage caps and spacing rules applied to every outbound fetch.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ComplianceError;

/// Default usage caps
pub const DEFAULT_DAILY_LIMIT: u32 = 50; // fetches per day
pub const DEFAULT_PER_MINUTE_LIMIT: u32 = 10; // fetches per trailing minute
pub const DEFAULT_MIN_SPACING_MS: u64 = 1000; // between admitted fetches

/// How the daily window is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayBoundary {
    /// Trailing 24 hours ending now
    Rolling,
    /// Resets at midnight UTC
    Calendar,
}

/// Who minimum spacing is measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpacingScope {
    /// One spacing clock shared by every caller
    Global,
    /// Each session has its own spacing clock
    PerSession,
}

/// Compliance configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Admitted attempts allowed per daily window
    pub daily_limit: u32,

    /// Admitted attempts allowed per trailing minute
    pub per_minute_limit: u32,

    /// Minimum gap between admitted attempts, in milliseconds
    pub min_spacing_ms: u64,

    /// Daily window policy
    pub day_boundary: DayBoundary,

    /// Spacing policy
    pub spacing_scope: SpacingScope,

    /// Sessions idle for longer than this are forgotten (None keeps them)
    pub session_idle_ttl_secs: Option<u64>,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
            per_minute_limit: DEFAULT_PER_MINUTE_LIMIT,
            min_spacing_ms: DEFAULT_MIN_SPACING_MS,
            day_boundary: DayBoundary::Rolling,
            spacing_scope: SpacingScope::Global,
            session_idle_ttl_secs: None,
        }
    }
}

impl ComplianceConfig {
    /// Create a configuration with default caps
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with explicit caps and spacing
    pub fn with_limits(daily_limit: u32, per_minute_limit: u32, min_spacing: Duration) -> Self {
        Self {
            daily_limit,
            per_minute_limit,
            min_spacing_ms: min_spacing.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Set the daily window policy
    pub fn day_boundary(mut self, boundary: DayBoundary) -> Self {
        self.day_boundary = boundary;
        self
    }

    /// Set the spacing policy
    pub fn spacing_scope(mut self, scope: SpacingScope) -> Self {
        self.spacing_scope = scope;
        self
    }

    /// Minimum spacing as a chrono duration
    pub fn min_spacing(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.min_spacing_ms as i64)
    }

    /// Length of the short window
    pub fn minute_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(1)
    }

    /// Length of a daily window
    pub fn day_window(&self) -> chrono::Duration {
        chrono::Duration::hours(24)
    }

    /// Idle session lifetime
    pub fn session_idle_ttl(&self) -> Option<chrono::Duration> {
        self.session_idle_ttl_secs
            .map(|secs| chrono::Duration::seconds(secs as i64))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ComplianceError> {
        if self.daily_limit == 0 {
            return Err(ComplianceError::InvalidConfig(
                "daily_limit must be > 0".to_string(),
            ));
        }
        if self.per_minute_limit == 0 {
            return Err(ComplianceError::InvalidConfig(
                "per_minute_limit must be > 0".to_string(),
            ));
        }
        if self.session_idle_ttl_secs == Some(0) {
            return Err(ComplianceError::InvalidConfig(
                "session_idle_ttl_secs must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ComplianceConfig::default();
        assert_eq!(config.daily_limit, DEFAULT_DAILY_LIMIT);
        assert_eq!(config.per_minute_limit, DEFAULT_PER_MINUTE_LIMIT);
        assert_eq!(config.min_spacing(), chrono::Duration::seconds(1));
        assert_eq!(config.day_boundary, DayBoundary::Rolling);
        assert_eq!(config.spacing_scope, SpacingScope::Global);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_limits() {
        let config = ComplianceConfig::with_limits(2, 10, Duration::ZERO)
            .day_boundary(DayBoundary::Calendar)
            .spacing_scope(SpacingScope::PerSession);
        assert_eq!(config.daily_limit, 2);
        assert_eq!(config.min_spacing_ms, 0);
        assert_eq!(config.day_boundary, DayBoundary::Calendar);
        assert_eq!(config.spacing_scope, SpacingScope::PerSession);
    }

    #[test]
    fn test_zero_limits_rejected() {
        let config = ComplianceConfig::with_limits(0, 10, Duration::ZERO);
        assert!(config.validate().is_err());

        let config = ComplianceConfig::with_limits(10, 0, Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_long_spacing_accepted() {
        let config = ComplianceConfig::with_limits(10, 10, Duration::from_secs(300));
        assert!(config.validate().is_ok());
        assert_eq!(config.min_spacing(), chrono::Duration::minutes(5));
    }

    #[test]
    fn test_zero_idle_ttl_rejected() {
        let config = ComplianceConfig {
            session_idle_ttl_secs: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = ComplianceConfig::default().day_boundary(DayBoundary::Calendar);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"calendar\""));
        let parsed: ComplianceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
