//! Database Error Types
//!
//! Errors raised while talking to a `NodeStore` backend. The tree services wrap
//! these as `TreeServiceError::StoreUnavailable`.

use std::time::Duration;
use thiserror::Error;

/// Store adapter errors
///
/// Covers backend failures and timeouts. Higher-level outcomes (missing nodes,
/// invariant violations) are reported by the service layer.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The backend rejected or failed the operation
    #[error("Store operation '{operation}' failed: {source}")]
    OperationFailed {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The operation did not complete within the configured timeout
    ///
    /// The outcome is unknown: the write may or may not have been applied.
    #[error("Store operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Failed to initialize the backend
    #[error("Failed to initialize store: {0}")]
    InitializationFailed(String),
}

impl DatabaseError {
    /// Create an operation failed error
    pub fn operation_failed(operation: &'static str, source: anyhow::Error) -> Self {
        Self::OperationFailed { operation, source }
    }

    /// Create a timeout error
    pub fn timeout(operation: &'static str, timeout: Duration) -> Self {
        Self::Timeout { operation, timeout }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Name of the store operation that failed, if known
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            DatabaseError::OperationFailed { operation, .. } => Some(*operation),
            DatabaseError::Timeout { operation, .. } => Some(*operation),
            DatabaseError::InitializationFailed(_) => None,
        }
    }

    /// True when the outcome of the failed call cannot be known
    pub fn is_timeout(&self) -> bool {
        matches!(self, DatabaseError::Timeout { .. })
    }
}
