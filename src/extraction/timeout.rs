//! Attempt Timeout
//!
//! Bounds a single attempt of a unit of work. When the budget expires the
//! attempt's future is dropped, which cancels whatever it was awaiting. A
//! panic inside the attempt is caught and reported as a failed attempt.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time;

/// Why an attempt did not produce a payload
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    /// The unit of work returned an error
    #[error("{0:#}")]
    Failed(anyhow::Error),

    /// The unit of work ran past its budget
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl AttemptError {
    /// Whether the attempt ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, AttemptError::TimedOut(_))
    }
}

/// Time budget for one attempt
#[derive(Debug, Clone, Copy)]
pub struct ExecutionTimeout {
    duration: Duration,
}

impl Default for ExecutionTimeout {
    fn default() -> Self {
        Self::from_secs(30)
    }
}

impl ExecutionTimeout {
    /// Create a new execution timeout
    ///
    /// ```
    /// use recipe_gate::extraction::ExecutionTimeout;
    /// use std::time::Duration;
    ///
    /// let timeout = ExecutionTimeout::new(Duration::from_secs(30));
    /// assert_eq!(timeout.duration(), Duration::from_secs(30));
    /// ```
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Create a timeout from seconds
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// The timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Drive `future` to completion or until the budget runs out
    pub async fn run<F, T>(&self, future: F) -> Result<T, AttemptError>
    where
        F: std::future::Future<Output = anyhow::Result<T>>,
    {
        let guarded = AssertUnwindSafe(future).catch_unwind();
        match time::timeout(self.duration, guarded).await {
            Ok(Ok(result)) => result.map_err(AttemptError::Failed),
            Ok(Err(panic)) => Err(AttemptError::Failed(anyhow::anyhow!(
                "unit of work panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(AttemptError::TimedOut(self.duration)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
