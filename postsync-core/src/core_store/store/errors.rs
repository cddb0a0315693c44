/*
    errors.rs - Error types for the store subsystem

    Defines all error types that can occur in:
    - Record and tombstone persistence
    - Record validation
    - Reconciliation passes
*/

use thiserror::Error;

/// Errors that can occur in the store subsystem
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage I/O error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Collection name not present in the collection table
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Another process holds the location's lock file
    #[error("Location locked: {0}")]
    Locked(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Validation-specific errors
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid field value
    #[error("Invalid field value: {field} - {reason}")]
    InvalidField { field: String, reason: String },

    /// Duplicate entry
    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    /// Identity already carries a tombstone
    #[error("Identity was deleted and cannot be reused: {0}")]
    Deleted(String),
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        StoreError::Validation(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
