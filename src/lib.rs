//! Recipe Gate Library
//!
//! Compliance-gated fetching of third-party recipe pages: admission control
//! over a shared usage ledger, retries with backoff, and a uniform result
//! envelope for every run. The ledger can be kept on disk between runs.

pub mod compliance;
pub mod config;
pub mod extraction;
pub mod logging;
pub mod metrics;
pub mod store;

pub use compliance::{ComplianceConfig, ComplianceMonitor, ComplianceStatus, DailyUsage};
pub use config::Config;
pub use store::UsageStore;
pub use extraction::{ComplianceGatedExecutor, ExtractionResult, RetryPolicy, UnitOfWork};
