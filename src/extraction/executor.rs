//! Compliance-Gated Executor
//!
//! Wraps a unit of work so that every attempt first passes admission
//! control, runs under a time budget, and is settled in the usage ledger
//! whatever happens to it. Callers always get an [`ExtractionResult`] back,
//! even when the unit of work panics.
//!
//! Flow of one run:
//!
//! 1. Reserve a slot (or return a `ComplianceRejected` result)
//! 2. Run the unit of work under the timeout
//! 3. Commit the reservation as success or failure
//! 4. On failure, back off and go to 1 until attempts run out

use std::time::{Duration, Instant};

use crate::compliance::session::generate_session_id;
use crate::compliance::{
    AdmitDecision, ComplianceError, ComplianceMonitor, ComplianceStatus, DailyUsage, Outcome,
    SessionTracker,
};
use crate::metrics;

use super::result::{ErrorKind, ExtractionError, ExtractionOutcome, ExtractionResult};
use super::retry::RetryPolicy;
use super::timeout::{AttemptError, ExecutionTimeout};
use super::work::UnitOfWork;

/// How a run ended, before it is wrapped into a result
struct Settled<T> {
    outcome: ExtractionOutcome<T>,
    status: ComplianceStatus,
}

/// Executes units of work behind the compliance monitor
#[derive(Debug, Clone)]
pub struct ComplianceGatedExecutor {
    monitor: ComplianceMonitor,
    retry: RetryPolicy,
    default_session: String,
}

impl ComplianceGatedExecutor {
    /// Create an executor over an existing monitor
    pub fn new(monitor: ComplianceMonitor, retry: RetryPolicy) -> Self {
        let default_session = generate_session_id(monitor.now());
        Self {
            monitor,
            retry,
            default_session,
        }
    }

    /// Admission controller
    pub fn monitor(&self) -> &ComplianceMonitor {
        &self.monitor
    }

    /// Session registry
    pub fn sessions(&self) -> &SessionTracker {
        self.monitor.sessions()
    }

    /// Retry policy
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Session used when a run names none
    pub fn default_session_id(&self) -> &str {
        &self.default_session
    }

    /// Current compliance status
    pub fn status(&self) -> Result<ComplianceStatus, ComplianceError> {
        self.monitor.status(self.monitor.now())
    }

    /// Current daily usage
    pub fn daily_usage(&self) -> Result<DailyUsage, ComplianceError> {
        self.monitor.daily_usage(self.monitor.now())
    }

    /// Run `unit` with `args` behind admission control
    ///
    /// Never fails: rejections, errors, timeouts and bookkeeping faults all
    /// come back as a failed [`ExtractionResult`].
    pub async fn run<A, T, W>(
        &self,
        unit: &W,
        args: A,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> ExtractionResult<T>
    where
        W: UnitOfWork<A, T> + ?Sized,
        A: Clone + Send + 'static,
        T: Send + 'static,
    {
        let started = Instant::now();
        let session = session_id.unwrap_or(&self.default_session).to_string();
        let mut warnings = Vec::new();
        let mut attempts = 0;

        let evicted = self.sessions().evict_idle(self.monitor.now());
        if evicted > 0 {
            tracing::debug!("Evicted {} idle sessions", evicted);
        }

        let settled = self
            .drive(
                unit,
                args,
                &session,
                ExecutionTimeout::new(timeout),
                &mut warnings,
                &mut attempts,
            )
            .await;

        let (outcome, compliance) = match settled {
            Ok(Settled { outcome, status }) => (outcome, Some(status)),
            Err(e) => {
                tracing::error!(session = %session, "Usage bookkeeping failed: {}", e);
                let error = ExtractionError::new(ErrorKind::InternalInconsistency, e.to_string());
                (
                    ExtractionOutcome::Failure { error },
                    self.monitor.status(self.monitor.now()).ok(),
                )
            }
        };

        ExtractionResult::new(
            outcome,
            compliance,
            started.elapsed(),
            warnings,
            attempts,
            session,
        )
    }

    async fn drive<A, T, W>(
        &self,
        unit: &W,
        args: A,
        session: &str,
        timeout: ExecutionTimeout,
        warnings: &mut Vec<String>,
        attempts: &mut u32,
    ) -> Result<Settled<T>, ComplianceError>
    where
        W: UnitOfWork<A, T> + ?Sized,
        A: Clone + Send + 'static,
        T: Send + 'static,
    {
        let max_attempts = self.retry.max_attempts.max(1);

        loop {
            let now = self.monitor.now();
            let reservation = match self.monitor.check_and_reserve(now, Some(session))? {
                AdmitDecision::Admitted(reservation) => reservation,
                AdmitDecision::Rejected(rejection) => {
                    metrics::GATE_REJECTIONS_TOTAL
                        .with_label_values(&[rejection.reason.as_str()])
                        .inc();
                    if *attempts > 0 {
                        warnings.push(format!(
                            "Retry after attempt {} rejected: {}",
                            attempts, rejection.reason
                        ));
                    }
                    return Ok(Settled {
                        outcome: ExtractionOutcome::Failure {
                            error: ExtractionError::rejected(&rejection),
                        },
                        status: rejection.status,
                    });
                }
            };

            *attempts += 1;
            let attempt = *attempts;

            let result = {
                let _in_flight = metrics::InFlightGuard::enter();
                let _timer = metrics::GATE_ATTEMPT_DURATION_SECONDS.start_timer();
                timeout.run(unit.perform(args.clone())).await
            };

            match result {
                Ok(payload) => {
                    reservation.commit(Outcome::Success)?;
                    let now = self.monitor.now();
                    metrics::GATE_ATTEMPTS_TOTAL
                        .with_label_values(&[Outcome::Success.as_str()])
                        .inc();

                    if attempt > 1 {
                        tracing::info!(session, "Succeeded on attempt {}", attempt);
                    }
                    return Ok(Settled {
                        outcome: ExtractionOutcome::Success { payload },
                        status: self.monitor.status(now)?,
                    });
                }
                Err(err) => {
                    reservation.commit(Outcome::Failure)?;
                    let now = self.monitor.now();
                    let label = if err.is_timeout() { "timeout" } else { "failure" };
                    metrics::GATE_ATTEMPTS_TOTAL.with_label_values(&[label]).inc();

                    let kind = match err {
                        AttemptError::TimedOut(_) => ErrorKind::Timeout,
                        AttemptError::Failed(_) => ErrorKind::ExtractionFailed,
                    };
                    warnings.push(format!("Attempt {} failed: {}", attempt, err));

                    if attempt >= max_attempts {
                        tracing::warn!(session, "Giving up after {} attempts: {}", attempt, err);
                        return Ok(Settled {
                            outcome: ExtractionOutcome::Failure {
                                error: ExtractionError::new(kind, err.to_string()),
                            },
                            status: self.monitor.status(now)?,
                        });
                    }

                    let delay = self.retry.calculate_delay(attempt - 1);
                    tracing::warn!(
                        session,
                        "Attempt {} failed: {}, retrying after {:?}",
                        attempt,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
