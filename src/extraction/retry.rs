//! Retry Policy
//!
//! Bounded retries with exponential backoff for failed or timed-out units
//! of work. Every retry goes back through admission control, so a retry can
//! itself be rejected.
//!
//! # Example
//!
//! ```
//! use recipe_gate::extraction::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(5));
//!
//! assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::compliance::ComplianceError;

/// Default number of admitted attempts per run
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Retry policy
///
/// # Fields
///
/// * `max_attempts` - Admitted attempts per run, first one included (default: 2)
/// * `base_delay_ms` - Delay before the first retry (default: 1s)
/// * `backoff_factor` - Multiplier applied per retry (default: 2.0)
/// * `max_delay_ms` - Cap on any single delay (default: 8s)
/// * `jitter` - Extra random delay as a fraction of the computed one (default: 0.0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Admitted attempts per run, first one included
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,

    /// Multiplier applied per retry
    pub backoff_factor: f64,

    /// Cap on any single delay, in milliseconds
    pub max_delay_ms: u64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: 1000,
            backoff_factor: 2.0,
            max_delay_ms: 8000,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self::default().max_attempts(1)
    }

    /// Set the number of admitted attempts per run
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the delay before the first retry
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the per-retry multiplier
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the cap on any single delay
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the jitter factor, clamped to 0.0..=1.0
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before the first retry
    pub fn base_delay_duration(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Cap on any single delay
    pub fn max_delay_duration(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Delay to wait before retry number `retry` (0 for the first retry)
    ///
    /// `base * factor^retry`, plus jitter, capped at the max delay.
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let cap = self.max_delay_duration().as_secs_f64();
        let exponential = self.base_delay_duration().as_secs_f64()
            * self.backoff_factor.powi(retry.min(64) as i32);
        let capped = if exponential.is_finite() {
            exponential.min(cap)
        } else {
            cap
        };

        let jitter = if self.jitter > 0.0 {
            capped * self.jitter * rand::random::<f64>()
        } else {
            0.0
        };

        Duration::from_secs_f64((capped + jitter).clamp(0.0, cap))
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), ComplianceError> {
        if self.max_attempts == 0 {
            return Err(ComplianceError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ComplianceError::InvalidConfig(format!(
                "retry.backoff_factor must be >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ComplianceError::InvalidConfig(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ComplianceError::InvalidConfig(format!(
                "retry.jitter must be within 0.0..=1.0, got {}",
                self.jitter
            )));
        }
        Ok(())
    }
}
