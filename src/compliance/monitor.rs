//! Compliance Monitor
//!
//! Admission control for outbound fetches. Every decision runs under one
//! lock that guards the ledger, the in-flight reservations, and the
//! last-admission instants, so two callers can never both take the last
//! slot.
//!
//! Every decision and every settled reservation is also tallied against its
//! session in the monitor's [`SessionTracker`].
//!
//! Trailing windows are half-open: at `now`, a window of length `w` covers
//! `(now - w, now]`. An event exactly `w` old has aged out, which makes a
//! reported `next_eligible_at` admissible at that very instant.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::config::{ComplianceConfig, DayBoundary, SpacingScope};
use super::error::ComplianceError;
use super::ledger::{attempts, Outcome, UsageEvent, UsageLedger};
use super::session::SessionTracker;
use super::status::{ComplianceStatus, DailyUsage, RejectReason, StatusTag};

/// Admitted attempt that has not settled yet
#[derive(Debug, Clone)]
struct InFlight {
    admitted_at: DateTime<Utc>,
    session_id: Option<String>,
}

/// Everything the admission lock protects
#[derive(Debug, Default)]
struct AdmissionState {
    ledger: UsageLedger,
    in_flight: HashMap<Uuid, InFlight>,
    last_admitted: Option<DateTime<Utc>>,
    last_admitted_by_session: HashMap<Option<String>, DateTime<Utc>>,
}

impl AdmissionState {
    /// Settled and in-flight attempts at or after `since`
    fn attempts_since(&self, since: DateTime<Utc>) -> u32 {
        let pending = self
            .in_flight
            .values()
            .filter(|r| r.admitted_at >= since)
            .count() as u32;
        self.ledger.count_since(since, attempts) + pending
    }

    /// Oldest settled or in-flight attempt at or after `since`
    fn oldest_attempt_since(&self, since: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let settled = self.ledger.oldest_since(since, attempts);
        let pending = self
            .in_flight
            .values()
            .map(|r| r.admitted_at)
            .filter(|t| *t >= since)
            .min();
        match (settled, pending) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Lower bounds of the live windows at one instant
#[derive(Debug, Clone, Copy)]
struct Windows {
    /// Reported start of the daily window
    daily_start: DateTime<Utc>,
    /// First instant counted toward the daily cap
    daily_from: DateTime<Utc>,
    /// First instant counted toward the minute cap
    minute_from: DateTime<Utc>,
}

/// Counts and verdict for one instant
#[derive(Debug, Clone, Copy)]
struct Assessment {
    windows: Windows,
    daily_count: u32,
    minute_count: u32,
    rejection: Option<(RejectReason, DateTime<Utc>)>,
}

/// Result of an admission check
#[derive(Debug)]
pub enum AdmitDecision {
    /// Slot reserved; settle the reservation once the work is done
    Admitted(Reservation),
    /// Slot refused
    Rejected(Rejection),
}

impl AdmitDecision {
    /// Whether the attempt was admitted
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmitDecision::Admitted(_))
    }
}

/// Details of a refused attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// First failing check
    pub reason: RejectReason,

    /// Earliest instant the failing check would pass
    pub next_eligible_at: DateTime<Utc>,

    /// Status at decision time
    pub status: ComplianceStatus,
}

/// Provisional hold on an admission slot
///
/// Counts toward both caps until it is committed (becoming a
/// [`UsageEvent`]) or released. A reservation dropped without either is
/// committed as a failure.
#[derive(Debug)]
pub struct Reservation {
    id: Uuid,
    admitted_at: DateTime<Utc>,
    session_id: Option<String>,
    monitor: ComplianceMonitor,
    settled: bool,
}

impl Reservation {
    /// Reservation identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Instant the slot was granted
    pub fn admitted_at(&self) -> DateTime<Utc> {
        self.admitted_at
    }

    /// Session the slot was granted to
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Convert the hold into a recorded usage event
    pub fn commit(mut self, outcome: Outcome) -> Result<UsageEvent, ComplianceError> {
        self.settled = true;
        self.monitor.settle_record(self.id, outcome)
    }

    /// Give the slot back without recording anything
    ///
    /// Only valid when the unit of work never started.
    pub fn release(mut self) -> Result<(), ComplianceError> {
        self.settled = true;
        self.monitor.settle_release(self.id)
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::warn!(
            reservation = %self.id,
            "Reservation dropped before settling, recording as failure"
        );
        if let Err(e) = self.monitor.settle_record(self.id, Outcome::Failure) {
            tracing::error!(reservation = %self.id, "Failed to settle dropped reservation: {}", e);
        }
    }
}

/// Admission controller shared by every caller
#[derive(Debug, Clone)]
pub struct ComplianceMonitor {
    /// Configuration
    config: Arc<ComplianceConfig>,

    /// Time source
    clock: Arc<dyn Clock>,

    /// Ledger, reservations and spacing state
    state: Arc<Mutex<AdmissionState>>,

    /// Per-session tallies of decisions and settled attempts
    sessions: SessionTracker,
}

impl ComplianceMonitor {
    /// Create a monitor reading the system clock
    pub fn new(config: ComplianceConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a monitor with an explicit time source
    pub fn with_clock(config: ComplianceConfig, clock: Arc<dyn Clock>) -> Self {
        let sessions = match config.session_idle_ttl() {
            Some(ttl) => SessionTracker::with_idle_ttl(ttl),
            None => SessionTracker::new(),
        };
        Self {
            config: Arc::new(config),
            clock,
            state: Arc::new(Mutex::new(AdmissionState::default())),
            sessions,
        }
    }

    /// Create with default configuration
    pub fn default_config() -> Self {
        Self::new(ComplianceConfig::default())
    }

    /// Current configuration
    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    /// Current instant according to the monitor's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Session registry fed by this monitor
    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Load previously settled events into the ledger
    ///
    /// Events outside every live window are skipped. The newest event also
    /// seeds the spacing state, so spacing holds across process restarts.
    /// Returns the number of events kept.
    pub fn restore<I>(&self, events: I) -> Result<usize, ComplianceError>
    where
        I: IntoIterator<Item = UsageEvent>,
    {
        let horizon = self.retention_horizon(self.clock.now());
        let mut state = self.lock()?;
        let mut kept = 0;

        for event in events {
            if !event.outcome.is_attempt() || event.timestamp < horizon {
                continue;
            }
            state.last_admitted = Some(
                state
                    .last_admitted
                    .map_or(event.timestamp, |last| last.max(event.timestamp)),
            );
            let last = state
                .last_admitted_by_session
                .entry(event.session_id.clone())
                .or_insert(event.timestamp);
            *last = (*last).max(event.timestamp);
            state.ledger.record(event);
            kept += 1;
        }

        tracing::debug!("Restored {} usage events", kept);
        Ok(kept)
    }

    /// Decide whether an attempt may start, reserving a slot if so
    pub fn check_and_reserve(
        &self,
        now: DateTime<Utc>,
        session_id: Option<&str>,
    ) -> Result<AdmitDecision, ComplianceError> {
        let mut state = self.lock()?;
        let assessment = self.assess(&state, now, session_id, true);

        if let Some((reason, next_eligible_at)) = assessment.rejection {
            let status = self.status_from(&assessment, state.in_flight.len() as u32, now);
            drop(state);
            if let Some(session) = session_id {
                self.sessions.touch(session, now, Outcome::Rejected);
            }
            tracing::info!(
                session = session_id.unwrap_or("anonymous"),
                %reason,
                %next_eligible_at,
                "Attempt rejected"
            );
            return Ok(AdmitDecision::Rejected(Rejection {
                reason,
                next_eligible_at,
                status,
            }));
        }

        let id = Uuid::new_v4();
        let session_key = session_id.map(str::to_string);
        state.in_flight.insert(
            id,
            InFlight {
                admitted_at: now,
                session_id: session_key.clone(),
            },
        );
        state.last_admitted = Some(state.last_admitted.map_or(now, |last| last.max(now)));
        let spacing = self.config.min_spacing();
        state
            .last_admitted_by_session
            .retain(|_, at| now - *at < spacing);
        state.last_admitted_by_session.insert(session_key.clone(), now);

        tracing::info!(
            reservation = %id,
            session = session_id.unwrap_or("anonymous"),
            daily = assessment.daily_count + 1,
            daily_limit = self.config.daily_limit,
            "Attempt admitted"
        );

        Ok(AdmitDecision::Admitted(Reservation {
            id,
            admitted_at: now,
            session_id: session_key,
            monitor: self.clone(),
            settled: false,
        }))
    }

    /// Status as of `now`; never mutates anything
    pub fn status(&self, now: DateTime<Utc>) -> Result<ComplianceStatus, ComplianceError> {
        let state = self.lock()?;
        let check_spacing = self.config.spacing_scope == SpacingScope::Global;
        let assessment = self.assess(&state, now, None, check_spacing);
        Ok(self.status_from(&assessment, state.in_flight.len() as u32, now))
    }

    /// Daily usage report as of `now`
    pub fn daily_usage(&self, now: DateTime<Utc>) -> Result<DailyUsage, ComplianceError> {
        let state = self.lock()?;
        let windows = self.windows(now);
        let count = state.attempts_since(windows.daily_from);
        Ok(DailyUsage {
            count,
            limit: self.config.daily_limit,
            remaining: self.config.daily_limit.saturating_sub(count),
            window_start: windows.daily_start,
        })
    }

    /// Copy of every retained usage event, oldest first
    pub fn recorded_events(&self) -> Result<Vec<UsageEvent>, ComplianceError> {
        let state = self.lock()?;
        Ok(state.ledger.events().cloned().collect())
    }

    /// Number of reservations not yet settled
    pub fn in_flight(&self) -> Result<usize, ComplianceError> {
        Ok(self.lock()?.in_flight.len())
    }

    fn settle_record(&self, id: Uuid, outcome: Outcome) -> Result<UsageEvent, ComplianceError> {
        if !outcome.is_attempt() {
            return Err(ComplianceError::InternalInconsistency(format!(
                "reservation {} cannot settle as {}",
                id,
                outcome.as_str()
            )));
        }

        let mut state = self.lock()?;
        let pending = state.in_flight.remove(&id).ok_or_else(|| {
            ComplianceError::InternalInconsistency(format!("reservation {} is not in flight", id))
        })?;

        let event = UsageEvent::new(pending.admitted_at, pending.session_id, outcome);
        state.ledger.record(event.clone());

        let now = self.clock.now();
        let horizon = self.retention_horizon(now);
        let evicted = state.ledger.evict_before(horizon);
        drop(state);
        if evicted > 0 {
            tracing::debug!("Evicted {} usage events older than {}", evicted, horizon);
        }

        if let Some(session) = event.session_id.as_deref() {
            self.sessions.touch(session, now, outcome);
        }

        Ok(event)
    }

    fn settle_release(&self, id: Uuid) -> Result<(), ComplianceError> {
        let mut state = self.lock()?;
        state.in_flight.remove(&id).map(|_| ()).ok_or_else(|| {
            ComplianceError::InternalInconsistency(format!("reservation {} is not in flight", id))
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, AdmissionState>, ComplianceError> {
        self.state.lock().map_err(|_| ComplianceError::poisoned())
    }

    fn windows(&self, now: DateTime<Utc>) -> Windows {
        let (daily_start, daily_from) = match self.config.day_boundary {
            DayBoundary::Rolling => {
                let start = now - self.config.day_window();
                (start, just_after(start))
            }
            DayBoundary::Calendar => {
                let midnight = start_of_day(now);
                (midnight, midnight)
            }
        };
        Windows {
            daily_start,
            daily_from,
            minute_from: just_after(now - self.config.minute_window()),
        }
    }

    /// Oldest instant any live window can still reach back to
    fn retention_horizon(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let windows = self.windows(now);
        windows.daily_from.min(windows.minute_from)
    }

    fn assess(
        &self,
        state: &AdmissionState,
        now: DateTime<Utc>,
        session_id: Option<&str>,
        check_spacing: bool,
    ) -> Assessment {
        let windows = self.windows(now);
        let daily_count = state.attempts_since(windows.daily_from);
        let minute_count = state.attempts_since(windows.minute_from);

        let rejection = if daily_count >= self.config.daily_limit {
            let next = match self.config.day_boundary {
                DayBoundary::Rolling => state
                    .oldest_attempt_since(windows.daily_from)
                    .map_or(now, |oldest| oldest + self.config.day_window()),
                DayBoundary::Calendar => windows.daily_start + self.config.day_window(),
            };
            Some((RejectReason::DailyLimitReached, next))
        } else if minute_count >= self.config.per_minute_limit {
            let next = state
                .oldest_attempt_since(windows.minute_from)
                .map_or(now, |oldest| oldest + self.config.minute_window());
            Some((RejectReason::RateLimited, next))
        } else if check_spacing {
            self.spacing_violation(state, now, session_id)
                .map(|next| (RejectReason::RateLimited, next))
        } else {
            None
        };

        Assessment {
            windows,
            daily_count,
            minute_count,
            rejection,
        }
    }

    /// Instant spacing will allow the next attempt, if it does not yet
    fn spacing_violation(
        &self,
        state: &AdmissionState,
        now: DateTime<Utc>,
        session_id: Option<&str>,
    ) -> Option<DateTime<Utc>> {
        let spacing = self.config.min_spacing();
        if spacing <= chrono::Duration::zero() {
            return None;
        }

        let last = match self.config.spacing_scope {
            SpacingScope::Global => state.last_admitted,
            SpacingScope::PerSession => state
                .last_admitted_by_session
                .get(&session_id.map(str::to_string))
                .copied(),
        }?;

        if now - last < spacing {
            Some(last + spacing)
        } else {
            None
        }
    }

    fn status_from(&self, a: &Assessment, in_flight: u32, now: DateTime<Utc>) -> ComplianceStatus {
        ComplianceStatus {
            status: a
                .rejection
                .map_or(StatusTag::Compliant, |(reason, _)| reason.into()),
            daily_usage_count: a.daily_count,
            per_minute_usage_count: a.minute_count,
            daily_limit: self.config.daily_limit,
            per_minute_limit: self.config.per_minute_limit,
            remaining_daily: self.config.daily_limit.saturating_sub(a.daily_count),
            remaining_per_minute: self.config.per_minute_limit.saturating_sub(a.minute_count),
            in_flight,
            daily_window_start: a.windows.daily_start,
            next_eligible_at: a.rejection.map(|(_, next)| next),
            checked_at: now,
        }
    }
}

/// Smallest representable instant after `t`
fn just_after(t: DateTime<Utc>) -> DateTime<Utc> {
    t + chrono::Duration::nanoseconds(1)
}

/// Midnight UTC on the day containing `t`
fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&t.date_naive().and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::clock::ManualClock;
    use std::time::Duration;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn monitor(config: ComplianceConfig) -> (ComplianceMonitor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        (ComplianceMonitor::with_clock(config, clock.clone()), clock)
    }

    fn admit(monitor: &ComplianceMonitor, now: DateTime<Utc>, session: Option<&str>) -> Reservation {
        match monitor.check_and_reserve(now, session).unwrap() {
            AdmitDecision::Admitted(reservation) => reservation,
            AdmitDecision::Rejected(r) => panic!("expected admission, got {:?}", r.reason),
        }
    }

    fn reject(monitor: &ComplianceMonitor, now: DateTime<Utc>, session: Option<&str>) -> Rejection {
        match monitor.check_and_reserve(now, session).unwrap() {
            AdmitDecision::Admitted(_) => panic!("expected rejection"),
            AdmitDecision::Rejected(rejection) => rejection,
        }
    }

    #[test]
    fn test_monitor_creation() {
        let monitor = ComplianceMonitor::default_config();
        assert_eq!(monitor.config().daily_limit, 50);
        assert_eq!(monitor.in_flight().unwrap(), 0);
    }

    #[test]
    fn test_daily_limit_rolling() {
        let (monitor, _) = monitor(ComplianceConfig::with_limits(2, 10, Duration::ZERO));
        let t0 = start();

        admit(&monitor, t0, None).commit(Outcome::Success).unwrap();
        admit(&monitor, t0 + chrono::Duration::seconds(5), None)
            .commit(Outcome::Failure)
            .unwrap();

        let rejection = reject(&monitor, t0 + chrono::Duration::seconds(10), None);
        assert_eq!(rejection.reason, RejectReason::DailyLimitReached);
        assert_eq!(rejection.next_eligible_at, t0 + chrono::Duration::hours(24));
        assert_eq!(rejection.status.status, StatusTag::DailyLimitReached);
        assert_eq!(rejection.status.remaining_daily, 0);

        // The oldest attempt has aged out exactly at next_eligible_at
        let reservation = admit(&monitor, rejection.next_eligible_at, None);
        reservation.release().unwrap();
    }

    #[test]
    fn test_daily_limit_calendar() {
        let config = ComplianceConfig::with_limits(1, 10, Duration::ZERO)
            .day_boundary(DayBoundary::Calendar);
        let (monitor, _) = monitor(config);
        let t0 = start();

        admit(&monitor, t0, None).commit(Outcome::Success).unwrap();

        let rejection = reject(&monitor, t0 + chrono::Duration::hours(1), None);
        let midnight = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        assert_eq!(rejection.reason, RejectReason::DailyLimitReached);
        assert_eq!(rejection.next_eligible_at, midnight);
        assert_eq!(
            rejection.status.daily_window_start,
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );

        admit(&monitor, midnight, None).release().unwrap();
    }

    #[test]
    fn test_per_minute_limit() {
        let (monitor, _) = monitor(ComplianceConfig::with_limits(100, 3, Duration::ZERO));
        let t0 = start();

        for i in 0..3 {
            admit(&monitor, t0 + chrono::Duration::seconds(i), None)
                .commit(Outcome::Success)
                .unwrap();
        }

        let rejection = reject(&monitor, t0 + chrono::Duration::seconds(30), None);
        assert_eq!(rejection.reason, RejectReason::RateLimited);
        assert_eq!(rejection.next_eligible_at, t0 + chrono::Duration::seconds(60));
        assert_eq!(rejection.status.per_minute_usage_count, 3);

        admit(&monitor, t0 + chrono::Duration::seconds(60), None)
            .commit(Outcome::Success)
            .unwrap();
    }

    #[test]
    fn test_daily_check_wins_over_minute_check() {
        let (monitor, _) = monitor(ComplianceConfig::with_limits(2, 2, Duration::ZERO));
        let t0 = start();

        admit(&monitor, t0, None).commit(Outcome::Success).unwrap();
        admit(&monitor, t0, None).commit(Outcome::Success).unwrap();

        let rejection = reject(&monitor, t0, None);
        assert_eq!(rejection.reason, RejectReason::DailyLimitReached);
    }

    #[test]
    fn test_global_spacing() {
        let (monitor, _) = monitor(ComplianceConfig::with_limits(
            100,
            100,
            Duration::from_secs(1),
        ));
        let t0 = start();

        admit(&monitor, t0, Some("a")).commit(Outcome::Success).unwrap();

        let rejection = reject(&monitor, t0 + chrono::Duration::milliseconds(500), Some("b"));
        assert_eq!(rejection.reason, RejectReason::RateLimited);
        assert_eq!(rejection.next_eligible_at, t0 + chrono::Duration::seconds(1));

        admit(&monitor, t0 + chrono::Duration::seconds(1), Some("b"))
            .commit(Outcome::Success)
            .unwrap();
    }

    #[test]
    fn test_per_session_spacing() {
        let config = ComplianceConfig::with_limits(100, 100, Duration::from_secs(1))
            .spacing_scope(SpacingScope::PerSession);
        let (monitor, _) = monitor(config);
        let t0 = start();

        admit(&monitor, t0, Some("a")).commit(Outcome::Success).unwrap();
        admit(&monitor, t0, Some("b")).commit(Outcome::Success).unwrap();

        let rejection = reject(&monitor, t0 + chrono::Duration::milliseconds(200), Some("a"));
        assert_eq!(rejection.reason, RejectReason::RateLimited);
    }

    #[test]
    fn test_rejection_records_nothing() {
        let (monitor, _) = monitor(ComplianceConfig::with_limits(1, 10, Duration::ZERO));
        let t0 = start();

        admit(&monitor, t0, None).commit(Outcome::Success).unwrap();
        let before = monitor.recorded_events().unwrap();

        reject(&monitor, t0, None);
        reject(&monitor, t0, None);

        assert_eq!(monitor.recorded_events().unwrap(), before);
    }

    #[test]
    fn test_in_flight_reservations_count_toward_caps() {
        let (monitor, _) = monitor(ComplianceConfig::with_limits(2, 10, Duration::ZERO));
        let t0 = start();

        let first = admit(&monitor, t0, None);
        let second = admit(&monitor, t0, None);
        assert_eq!(monitor.in_flight().unwrap(), 2);

        let rejection = reject(&monitor, t0, None);
        assert_eq!(rejection.reason, RejectReason::DailyLimitReached);
        assert_eq!(rejection.status.in_flight, 2);

        first.commit(Outcome::Success).unwrap();
        second.release().unwrap();
        assert_eq!(monitor.in_flight().unwrap(), 0);
        assert_eq!(monitor.recorded_events().unwrap().len(), 1);

        admit(&monitor, t0, None).commit(Outcome::Success).unwrap();
    }

    #[test]
    fn test_dropped_reservation_settles_as_failure() {
        let (monitor, _) = monitor(ComplianceConfig::with_limits(5, 10, Duration::ZERO));

        {
            let _reservation = admit(&monitor, start(), Some("s"));
        }

        let events = monitor.recorded_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, Outcome::Failure);
        assert_eq!(events[0].session_id.as_deref(), Some("s"));
        assert_eq!(monitor.in_flight().unwrap(), 0);
    }

    #[test]
    fn test_commit_as_rejected_is_inconsistent() {
        let (monitor, _) = monitor(ComplianceConfig::with_limits(5, 10, Duration::ZERO));
        let reservation = admit(&monitor, start(), None);

        let result = reservation.commit(Outcome::Rejected);
        assert!(matches!(
            result,
            Err(ComplianceError::InternalInconsistency(_))
        ));
    }

    #[test]
    fn test_status_is_pure() {
        let (monitor, _) = monitor(ComplianceConfig::with_limits(5, 10, Duration::from_secs(1)));
        let t0 = start();
        admit(&monitor, t0, None).commit(Outcome::Success).unwrap();

        let now = t0 + chrono::Duration::milliseconds(100);
        let first = monitor.status(now).unwrap();
        let second = monitor.status(now).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.status, StatusTag::RateLimited);
        assert_eq!(first.daily_usage_count, 1);
        assert_eq!(first.remaining_daily, 4);
        assert_eq!(monitor.recorded_events().unwrap().len(), 1);
    }

    #[test]
    fn test_eviction_after_daily_window() {
        let (monitor, clock) = monitor(ComplianceConfig::with_limits(5, 10, Duration::ZERO));
        let t0 = start();

        admit(&monitor, t0, None).commit(Outcome::Success).unwrap();
        admit(&monitor, t0, None).commit(Outcome::Success).unwrap();

        clock.advance(chrono::Duration::hours(25));
        let later = clock.now();
        admit(&monitor, later, None).commit(Outcome::Success).unwrap();

        let events = monitor.recorded_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, later);

        let usage = monitor.daily_usage(later).unwrap();
        assert_eq!(usage.count, 1);
        assert_eq!(usage.remaining, 4);
        assert_eq!(usage.window_start, later - chrono::Duration::hours(24));
    }

    #[test]
    fn test_eviction_keeps_minute_window_across_midnight() {
        let config = ComplianceConfig::with_limits(5, 10, Duration::ZERO)
            .day_boundary(DayBoundary::Calendar);
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 50).unwrap(),
        ));
        let monitor = ComplianceMonitor::with_clock(config, clock.clone());

        admit(&monitor, clock.now(), None)
            .commit(Outcome::Success)
            .unwrap();

        clock.advance(chrono::Duration::seconds(20));
        admit(&monitor, clock.now(), None)
            .commit(Outcome::Success)
            .unwrap();

        // Yesterday's attempt is still inside the trailing minute
        assert_eq!(monitor.recorded_events().unwrap().len(), 2);
        let status = monitor.status(clock.now()).unwrap();
        assert_eq!(status.daily_usage_count, 1);
        assert_eq!(status.per_minute_usage_count, 2);
    }

    #[test]
    fn test_dropped_reservation_touches_session() {
        let (monitor, _) = monitor(ComplianceConfig::with_limits(5, 10, Duration::ZERO));

        drop(admit(&monitor, start(), Some("s")));

        let session = monitor.sessions().snapshot("s").unwrap();
        assert_eq!(session.failure_count, 1);
        assert_eq!(session.event_count, 1);
    }

    #[test]
    fn test_decisions_are_tallied_per_session() {
        let (monitor, _) = monitor(ComplianceConfig::with_limits(1, 10, Duration::ZERO));
        let t0 = start();

        admit(&monitor, t0, Some("a")).commit(Outcome::Success).unwrap();
        reject(&monitor, t0, Some("a"));
        reject(&monitor, t0, None);

        let session = monitor.sessions().snapshot("a").unwrap();
        assert_eq!(session.success_count, 1);
        assert_eq!(session.rejected_count, 1);
        assert_eq!(monitor.sessions().count(), 1);
    }

    #[test]
    fn test_restore_counts_toward_caps() {
        let (monitor, _) = monitor(ComplianceConfig::with_limits(2, 10, Duration::ZERO));
        let t0 = start();
        let events = vec![
            UsageEvent::new(t0 - chrono::Duration::hours(30), None, Outcome::Success),
            UsageEvent::new(t0 - chrono::Duration::hours(2), None, Outcome::Success),
            UsageEvent::new(t0 - chrono::Duration::hours(1), None, Outcome::Failure),
        ];

        assert_eq!(monitor.restore(events).unwrap(), 2);
        assert_eq!(monitor.daily_usage(t0).unwrap().count, 2);

        let rejection = reject(&monitor, t0, None);
        assert_eq!(rejection.reason, RejectReason::DailyLimitReached);
        assert_eq!(rejection.next_eligible_at, t0 + chrono::Duration::hours(22));
    }

    #[test]
    fn test_restore_seeds_spacing() {
        let (monitor, _) = monitor(ComplianceConfig::with_limits(
            10,
            10,
            Duration::from_secs(5),
        ));
        let t0 = start();
        let last = t0 - chrono::Duration::seconds(2);
        monitor
            .restore([UsageEvent::new(last, Some("a".into()), Outcome::Success)])
            .unwrap();

        let rejection = reject(&monitor, t0, Some("b"));
        assert_eq!(rejection.reason, RejectReason::RateLimited);
        assert_eq!(rejection.next_eligible_at, last + chrono::Duration::seconds(5));
    }
}
