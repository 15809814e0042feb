//! Error types for queue store operations.

use herald_common::QueueItemId;
use thiserror::Error;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed enqueue input, rejected before anything is written.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The referenced item does not exist.
    #[error("item not found: {0}")]
    NotFound(QueueItemId),

    /// The backing store is unreachable or refused the operation.
    ///
    /// The dispatcher treats this as structural: the current tick aborts and
    /// the next tick retries against unchanged state.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Enqueue input validation failures.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("recipient email is empty")]
    EmptyEmail,

    #[error("recipient email is malformed: {0}")]
    MalformedEmail(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
