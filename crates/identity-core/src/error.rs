//! Store errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Expiration rejected for {key}: {reason}")]
    ExpirationRejected { key: String, reason: String },

    #[error("Transaction failed on {key}: {reason}")]
    TransactionFailed { key: String, reason: String },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Field is reserved: {0}")]
    ReservedField(String),
}

impl StoreError {
    /// Absence of a record or field. A normal outcome, never a transport failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
