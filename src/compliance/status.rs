//! Compliance Status Reports
//!
//! Derived views over the ledger. Nothing here is stored; every value is
//! recomputed when asked for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an attempt was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Per-minute cap hit or spacing not yet elapsed
    RateLimited,
    /// Daily cap hit
    DailyLimitReached,
}

impl RejectReason {
    /// Stable label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::RateLimited => "rate_limited",
            RejectReason::DailyLimitReached => "daily_limit_reached",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall compliance state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTag {
    /// Next attempt would be admitted
    Compliant,
    /// Next attempt would be refused by the minute cap or spacing
    RateLimited,
    /// Next attempt would be refused by the daily cap
    DailyLimitReached,
}

impl From<RejectReason> for StatusTag {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::RateLimited => StatusTag::RateLimited,
            RejectReason::DailyLimitReached => StatusTag::DailyLimitReached,
        }
    }
}

/// Snapshot of usage against the configured caps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceStatus {
    /// Overall state
    pub status: StatusTag,

    /// Attempts counted in the daily window (settled and in flight)
    pub daily_usage_count: u32,

    /// Attempts counted in the trailing minute (settled and in flight)
    pub per_minute_usage_count: u32,

    /// Daily cap
    pub daily_limit: u32,

    /// Per-minute cap
    pub per_minute_limit: u32,

    /// Slots left today
    pub remaining_daily: u32,

    /// Slots left this minute
    pub remaining_per_minute: u32,

    /// Reservations admitted but not yet settled
    pub in_flight: u32,

    /// Start of the current daily window
    pub daily_window_start: DateTime<Utc>,

    /// When an attempt could next be admitted (only when not compliant)
    pub next_eligible_at: Option<DateTime<Utc>>,

    /// Instant this snapshot describes
    pub checked_at: DateTime<Utc>,
}

impl ComplianceStatus {
    /// Whether the next attempt would be admitted
    pub fn is_compliant(&self) -> bool {
        self.status == StatusTag::Compliant
    }
}

/// Daily usage report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    /// Attempts counted in the daily window
    pub count: u32,

    /// Daily cap
    pub limit: u32,

    /// Slots left
    pub remaining: u32,

    /// Start of the daily window
    pub window_start: DateTime<Utc>,
}
