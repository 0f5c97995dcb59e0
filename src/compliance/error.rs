//! Compliance Error Types

/// Errors raised by the admission-control layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComplianceError {
    /// Ledger or reservation bookkeeping no longer adds up
    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ComplianceError {
    pub(crate) fn poisoned() -> Self {
        ComplianceError::InternalInconsistency("admission state lock poisoned".to_string())
    }
}
