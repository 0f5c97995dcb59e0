//! Gated Extraction
//!
//! Runs units of work behind the compliance monitor and wraps whatever
//! happens in an [`ExtractionResult`].
//!
//! # Example
//!
//! ```no_run
//! use recipe_gate::compliance::{ComplianceConfig, ComplianceMonitor};
//! use recipe_gate::extraction::{ComplianceGatedExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let monitor = ComplianceMonitor::new(ComplianceConfig::default());
//! let executor = ComplianceGatedExecutor::new(monitor, RetryPolicy::default());
//!
//! let unit = |name: String| async move { Ok::<_, anyhow::Error>(name.len()) };
//! let result = executor
//!     .run(&unit, "soup".to_string(), None, Duration::from_secs(5))
//!     .await;
//! assert!(result.is_success());
//! # }
//! ```

pub mod executor;
pub mod fetch;
pub mod result;
pub mod retry;
pub mod timeout;
pub mod work;

pub use executor::ComplianceGatedExecutor;
pub use fetch::{
    validate_recipe_url, FetchError, FetchedPage, PageFetcher, PageSummary, UrlValidation,
};
pub use result::{ErrorKind, ExtractionError, ExtractionOutcome, ExtractionResult};
pub use retry::RetryPolicy;
pub use timeout::{AttemptError, ExecutionTimeout};
pub use work::UnitOfWork;
