//! Error types for remote and local persistence

use thiserror::Error;

/// Result alias used throughout the crate
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by [`crate::NetworkStateStore`] and the remote backends
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The user identifier cannot address a record
    #[error("invalid user id '{id}': {reason}")]
    InvalidUserId { id: String, reason: &'static str },

    /// A store configuration field is unusable
    #[error("invalid config: field '{field}' {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// The remote store could not be reached
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// The remote store refused access to the document
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The remote client has been closed
    #[error("remote client is closed")]
    Closed,

    /// The local cache backend failed
    #[error("local storage error: {0}")]
    Storage(#[from] StorageError),

    /// A record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Transient failures a caller may reasonably retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    /// Returns true if the backend refused access
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StoreError::PermissionDenied(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Errors from a [`crate::local::KeyValueStorage`] backend
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No storage is available (private mode, no window, etc.)
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Writing the value would exceed the storage quota
    #[error("quota exceeded writing '{key}': {needed} bytes needed, limit {limit}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    /// Any other backend failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Unavailable("offline".into()).is_retryable());
        assert!(!StoreError::PermissionDenied("rules".into()).is_retryable());
        assert!(!StoreError::Closed.is_retryable());
        assert!(StoreError::PermissionDenied("rules".into()).is_permission_denied());
    }

    #[test]
    fn test_storage_error_converts() {
        let err: StoreError = StorageError::Unavailable("no window".into()).into();
        assert!(matches!(err, StoreError::Storage(StorageError::Unavailable(_))));
        assert_eq!(
            err.to_string(),
            "local storage error: storage unavailable: no window"
        );
    }

    #[test]
    fn test_serde_error_converts() {
        let err: StoreError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
