//! Error types for PlayLocal Lambda functions.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in PlayLocal Lambda functions.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Identity missing or does not own the record. The message is a plain
    /// access-denied string so callers cannot probe for record existence.
    #[error("Access denied: {0}")]
    Auth(String),

    /// Referenced record absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation invalid for the record's current status
    #[error("Invalid state: {0}")]
    State(String),

    /// Duplicate or idempotency violation (double-cancel, double-booking)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An external collaborator call failed (store, blob, mail, events)
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Auth(_) => 403,
            Error::NotFound(_) => 404,
            Error::State(_) => 409,
            Error::Conflict(_) => 409,
            Error::Dependency(_) => 502,
            Error::Serialization(_) => 400,
        }
    }
}
