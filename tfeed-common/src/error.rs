//! Common error types for tfeed

use thiserror::Error;

/// Common result type for tfeed operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across tfeed services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Event payload that can never be applied (missing or empty required field)
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Collaborator lookup failed; the event may succeed on redelivery
    #[error("Lookup failed: {0}")]
    Lookup(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures that redelivery can fix
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Io(_) | Error::Lookup(_))
    }
}
