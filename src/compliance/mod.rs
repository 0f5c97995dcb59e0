//! Compliance and Admission Control Module
//!
//! This module decides whether an outbound fetch may start, and keeps the
//! usage history those decisions are based on.
//!
//! # Features
//!
//! - Daily cap over a rolling 24 hour or calendar-day window
//! - Per-minute cap over a trailing 60 second window
//! - Minimum spacing between admitted attempts, global or per session
//! - Reservations that hold a slot while the work runs
//! - Per-session usage tallies
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Compliance Monitor                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐         │
//! │  │ Daily Cap   │  │ Minute Cap  │  │ Spacing     │         │
//! │  └─────────────┘  └─────────────┘  └─────────────┘         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │   Admission lock: Usage Ledger + In-flight slots    │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                 ▲                            ▲
//!              Clock                    Session Tracker
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod monitor;
pub mod session;
pub mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ComplianceConfig, DayBoundary, SpacingScope};
pub use error::ComplianceError;
pub use ledger::{Outcome, UsageEvent, UsageLedger};
pub use monitor::{AdmitDecision, ComplianceMonitor, Rejection, Reservation};
pub use session::{Session, SessionTracker};
pub use status::{ComplianceStatus, DailyUsage, RejectReason, StatusTag};
