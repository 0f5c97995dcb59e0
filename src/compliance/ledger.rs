//! Usage Ledger
//!
//! Time-ordered history of settled fetch attempts. Window counts are a
//! binary search over the ordered events.
//!
//! The ledger itself is not synchronised; [`super::ComplianceMonitor`] keeps
//! it behind the same lock as its in-flight reservations so counting and
//! recording are linearizable with admission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How an attempt ended
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Unit of work returned a payload
    Success,
    /// Unit of work failed or timed out
    Failure,
    /// Admission refused the attempt
    Rejected,
}

impl Outcome {
    /// Whether this outcome consumed an admission slot
    pub fn is_attempt(&self) -> bool {
        !matches!(self, Outcome::Rejected)
    }

    /// Stable label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Rejected => "rejected",
        }
    }
}

/// Record of one settled attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Instant the attempt was admitted
    pub timestamp: DateTime<Utc>,

    /// Session the attempt belongs to (None is anonymous)
    pub session_id: Option<String>,

    /// How the attempt ended
    pub outcome: Outcome,
}

impl UsageEvent {
    /// Create a new usage event
    pub fn new(timestamp: DateTime<Utc>, session_id: Option<String>, outcome: Outcome) -> Self {
        Self {
            timestamp,
            session_id,
            outcome,
        }
    }
}

/// Predicate matching every event that counts toward the caps
pub fn attempts(event: &UsageEvent) -> bool {
    event.outcome.is_attempt()
}

/// Ordered usage history
#[derive(Debug, Clone, Default)]
pub struct UsageLedger {
    /// Events sorted by timestamp
    events: VecDeque<UsageEvent>,
}

impl UsageLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event, keeping timestamp order
    ///
    /// Attempts settle out of order under concurrency, so the event is
    /// inserted after every event with an equal or earlier timestamp.
    pub fn record(&mut self, event: UsageEvent) {
        let idx = self
            .events
            .partition_point(|e| e.timestamp <= event.timestamp);
        self.events.insert(idx, event);
    }

    /// Count events at or after `since` that match `predicate`
    pub fn count_since<P>(&self, since: DateTime<Utc>, predicate: P) -> u32
    where
        P: Fn(&UsageEvent) -> bool,
    {
        let start = self.first_index_at_or_after(since);
        self.events.range(start..).filter(|e| predicate(e)).count() as u32
    }

    /// Timestamp of the oldest matching event at or after `since`
    pub fn oldest_since<P>(&self, since: DateTime<Utc>, predicate: P) -> Option<DateTime<Utc>>
    where
        P: Fn(&UsageEvent) -> bool,
    {
        let start = self.first_index_at_or_after(since);
        self.events
            .range(start..)
            .find(|e| predicate(e))
            .map(|e| e.timestamp)
    }

    /// Drop every event strictly older than `horizon`
    ///
    /// Returns the number of evicted events.
    pub fn evict_before(&mut self, horizon: DateTime<Utc>) -> usize {
        let cut = self.first_index_at_or_after(horizon);
        self.events.drain(..cut);
        cut
    }

    /// Iterate over events, oldest first
    pub fn events(&self) -> impl Iterator<Item = &UsageEvent> {
        self.events.iter()
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the ledger holds no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn first_index_at_or_after(&self, instant: DateTime<Utc>) -> usize {
        self.events.partition_point(|e| e.timestamp < instant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn event(offset_secs: i64, session: &str, outcome: Outcome) -> UsageEvent {
        UsageEvent::new(
            base() + chrono::Duration::seconds(offset_secs),
            Some(session.to_string()),
            outcome,
        )
    }

    #[test]
    fn test_ledger_creation() {
        let ledger = UsageLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.count_since(base(), attempts), 0);
    }

    #[test]
    fn test_record_keeps_order() {
        let mut ledger = UsageLedger::new();
        ledger.record(event(30, "a", Outcome::Success));
        ledger.record(event(10, "a", Outcome::Failure));
        ledger.record(event(20, "b", Outcome::Success));

        let stamps: Vec<_> = ledger.events().map(|e| e.timestamp).collect();
        let mut sorted = stamps.clone();
        sorted.sort();
        assert_eq!(stamps, sorted);
    }

    #[test]
    fn test_count_since_is_inclusive() {
        let mut ledger = UsageLedger::new();
        ledger.record(event(0, "a", Outcome::Success));
        ledger.record(event(10, "a", Outcome::Success));

        assert_eq!(ledger.count_since(base(), attempts), 2);
        assert_eq!(
            ledger.count_since(base() + chrono::Duration::seconds(10), attempts),
            1
        );
        assert_eq!(
            ledger.count_since(base() + chrono::Duration::seconds(11), attempts),
            0
        );
    }

    #[test]
    fn test_rejected_events_are_not_attempts() {
        let mut ledger = UsageLedger::new();
        ledger.record(event(0, "a", Outcome::Success));
        ledger.record(event(1, "a", Outcome::Rejected));
        ledger.record(event(2, "a", Outcome::Failure));

        assert_eq!(ledger.count_since(base(), attempts), 2);
        assert_eq!(ledger.count_since(base(), |_| true), 3);
    }

    #[test]
    fn test_oldest_since() {
        let mut ledger = UsageLedger::new();
        ledger.record(event(5, "a", Outcome::Rejected));
        ledger.record(event(7, "a", Outcome::Success));
        ledger.record(event(9, "a", Outcome::Success));

        assert_eq!(
            ledger.oldest_since(base(), attempts),
            Some(base() + chrono::Duration::seconds(7))
        );
        assert_eq!(
            ledger.oldest_since(base() + chrono::Duration::seconds(10), attempts),
            None
        );
    }

    #[test]
    fn test_evict_before_keeps_boundary() {
        let mut ledger = UsageLedger::new();
        ledger.record(event(0, "a", Outcome::Success));
        ledger.record(event(60, "a", Outcome::Success));
        ledger.record(event(120, "a", Outcome::Success));

        let evicted = ledger.evict_before(base() + chrono::Duration::seconds(60));
        assert_eq!(evicted, 1);
        assert_eq!(ledger.len(), 2);
        assert_eq!(
            ledger.oldest_since(base(), attempts),
            Some(base() + chrono::Duration::seconds(60))
        );
    }

    proptest! {
        #[test]
        fn prop_count_since_matches_linear_scan(
            offsets in proptest::collection::vec(0i64..3600, 0..64),
            since in 0i64..3600,
        ) {
            let mut ledger = UsageLedger::new();
            for (i, offset) in offsets.iter().enumerate() {
                let outcome = if i % 3 == 0 { Outcome::Failure } else { Outcome::Success };
                ledger.record(event(*offset, "p", outcome));
            }

            let cutoff = base() + chrono::Duration::seconds(since);
            let expected = offsets.iter().filter(|o| **o >= since).count() as u32;
            prop_assert_eq!(ledger.count_since(cutoff, attempts), expected);
        }
    }
}
