//! Service Layer Error Types
//!
//! Errors returned by `TreeService` and `PathResolver`. Every error reaches the
//! caller; nothing is retried automatically because a half-applied range shift is
//! not safe to repeat.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;

/// Tree operation errors
#[derive(Error, Debug)]
pub enum TreeServiceError {
    /// Referenced node, parent or path does not exist
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Malformed path or attributes, or a move that would create a cycle
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced record vanished between the caller's read and the mutation
    #[error("Conflict: node {id} no longer exists")]
    Conflict { id: String },

    /// An invariant check failed; the tree needs inspection or recovery
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    /// The store call failed or timed out
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] DatabaseError),

    /// Journal file could not be read or written
    #[error("Journal error: {0}")]
    JournalError(String),
}

impl TreeServiceError {
    /// Create a not found error for a node id
    pub fn node_not_found(id: impl AsRef<str>) -> Self {
        Self::NotFound {
            what: format!("node {}", id.as_ref()),
        }
    }

    /// Create a not found error for a path
    pub fn path_not_found(path: impl AsRef<str>) -> Self {
        Self::NotFound {
            what: format!("path '{}'", path.as_ref()),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(id: impl Into<String>) -> Self {
        Self::Conflict { id: id.into() }
    }

    /// Create a consistency violation error
    pub fn consistency_violation(msg: impl Into<String>) -> Self {
        Self::ConsistencyViolation(msg.into())
    }

    /// Create a journal error
    pub fn journal_error(msg: impl Into<String>) -> Self {
        Self::JournalError(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, Self::ConsistencyViolation(_))
    }
}

impl From<ValidationError> for TreeServiceError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            TreeServiceError::node_not_found("n-1").to_string(),
            "Not found: node n-1"
        );
        assert_eq!(
            TreeServiceError::path_not_found("root/a").to_string(),
            "Not found: path 'root/a'"
        );
        assert_eq!(
            TreeServiceError::conflict("n-2").to_string(),
            "Conflict: node n-2 no longer exists"
        );
    }

    #[test]
    fn test_validation_error_becomes_invalid_argument() {
        let err: TreeServiceError = ValidationError::MissingField("title".to_string()).into();
        assert!(matches!(err, TreeServiceError::InvalidArgument(_)));
    }
}
