//! Extraction Result Envelope
//!
//! Every gated run produces exactly one [`ExtractionResult`]. It is built
//! once by the executor and exposes read-only accessors afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

use crate::compliance::{ComplianceStatus, RejectReason, Rejection};

/// Failure category of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Admission control refused the attempt
    ComplianceRejected {
        /// First failing check
        reason: RejectReason,
        /// Earliest instant the check would pass
        next_eligible_at: DateTime<Utc>,
    },
    /// Unit of work reported an error
    ExtractionFailed,
    /// Unit of work exceeded its time budget
    Timeout,
    /// Usage bookkeeping no longer adds up
    InternalInconsistency,
}

impl ErrorKind {
    /// Stable label for logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ComplianceRejected { .. } => "compliance_rejected",
            ErrorKind::ExtractionFailed => "extraction_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InternalInconsistency => "internal_inconsistency",
        }
    }

    /// Whether another attempt may be made after this failure
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ExtractionFailed | ErrorKind::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure details of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionError {
    /// Failure category, flattened so its tag reads as `error.kind`
    #[serde(flatten)]
    pub kind: ErrorKind,

    /// Human-readable cause
    pub message: String,
}

impl ExtractionError {
    /// Create a new extraction error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Error describing an admission rejection
    pub fn rejected(rejection: &Rejection) -> Self {
        Self::new(
            ErrorKind::ComplianceRejected {
                reason: rejection.reason,
                next_eligible_at: rejection.next_eligible_at,
            },
            format!(
                "Compliance check failed: {} (next eligible at {})",
                rejection.reason,
                rejection.next_eligible_at.to_rfc3339()
            ),
        )
    }
}

/// Success or failure of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ExtractionOutcome<T> {
    /// Unit of work produced a payload
    Success {
        /// Payload returned by the unit of work
        payload: T,
    },
    /// Run ended without a payload
    Failure {
        /// Why
        error: ExtractionError,
    },
}

/// Uniform result of a gated run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult<T> {
    #[serde(flatten)]
    outcome: ExtractionOutcome<T>,
    compliance: Option<ComplianceStatus>,
    #[serde(serialize_with = "serialize_secs")]
    elapsed: Duration,
    warnings: Vec<String>,
    attempts: u32,
    session_id: String,
}

impl<T> ExtractionResult<T> {
    pub(crate) fn new(
        outcome: ExtractionOutcome<T>,
        compliance: Option<ComplianceStatus>,
        elapsed: Duration,
        warnings: Vec<String>,
        attempts: u32,
        session_id: String,
    ) -> Self {
        Self {
            outcome,
            compliance,
            elapsed,
            warnings,
            attempts,
            session_id,
        }
    }

    /// Whether the run produced a payload
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExtractionOutcome::Success { .. })
    }

    /// Success or failure
    pub fn outcome(&self) -> &ExtractionOutcome<T> {
        &self.outcome
    }

    /// Payload, present iff the run succeeded
    pub fn payload(&self) -> Option<&T> {
        match &self.outcome {
            ExtractionOutcome::Success { payload } => Some(payload),
            ExtractionOutcome::Failure { .. } => None,
        }
    }

    /// Take the payload out of the envelope
    pub fn into_payload(self) -> Option<T> {
        match self.outcome {
            ExtractionOutcome::Success { payload } => Some(payload),
            ExtractionOutcome::Failure { .. } => None,
        }
    }

    /// Failure details, present iff the run failed
    pub fn error(&self) -> Option<&ExtractionError> {
        match &self.outcome {
            ExtractionOutcome::Success { .. } => None,
            ExtractionOutcome::Failure { error } => Some(error),
        }
    }

    /// Failure category, present iff the run failed
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(|e| e.kind)
    }

    /// Failure message, present iff the run failed
    pub fn error_message(&self) -> Option<&str> {
        self.error().map(|e| e.message.as_str())
    }

    /// Compliance snapshot taken when the run was decided
    ///
    /// Absent only when the admission state itself could not be read.
    pub fn compliance(&self) -> Option<&ComplianceStatus> {
        self.compliance.as_ref()
    }

    /// Wall time spent in the run, backoff included
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Non-fatal notes, in the order they occurred
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Number of admitted executions of the unit of work
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Session the run was accounted to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Transform the payload, keeping everything else
    pub fn map_payload<U, F>(self, f: F) -> ExtractionResult<U>
    where
        F: FnOnce(T) -> U,
    {
        let outcome = match self.outcome {
            ExtractionOutcome::Success { payload } => ExtractionOutcome::Success {
                payload: f(payload),
            },
            ExtractionOutcome::Failure { error } => ExtractionOutcome::Failure { error },
        };
        ExtractionResult {
            outcome,
            compliance: self.compliance,
            elapsed: self.elapsed,
            warnings: self.warnings,
            attempts: self.attempts,
            session_id: self.session_id,
        }
    }
}

fn serialize_secs<S>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(elapsed.as_secs_f64())
}
