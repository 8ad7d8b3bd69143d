//! Transaction error types.
//!
//! Errors fall in four groups: resource failures (some transient), deadline
//! expiry, caller cancellation and business failures raised by caller code.
//! Only transient resource failures are retried by the engine. Nesting
//! violations are not errors at all; the guard aborts instead.

use std::time::Duration;

use thiserror::Error;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Boxed error raised by caller-supplied logic.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classifies an error as worth retrying the whole unit of work for.
pub trait Transient {
    /// Check if this error is transient.
    fn is_transient(&self) -> bool;
}

/// Errors reported by a transactional resource.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// Another transaction committed changes to the same keys first.
    #[error("transaction conflict on keys: {}", keys.join(", "))]
    Conflict {
        /// Keys modified both by this transaction and a concurrent one.
        keys: Vec<String>,
    },

    /// Deadlock detected by the resource.
    #[error("deadlock detected in session {session}")]
    Deadlock { session: String },

    /// Serialization failure - retry the transaction.
    #[error("serialization failure, please retry transaction")]
    SerializationFailure,

    /// The connection to the resource dropped mid-transaction.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// An operation needed an open transaction but there was none.
    #[error("session {session} has no open transaction")]
    NotActive { session: String },

    /// The resource refused to hand out a session.
    #[error("resource unavailable: {0}")]
    Unavailable(String),

    /// Internal error.
    #[error("internal resource error: {0}")]
    Internal(String),
}

impl ResourceError {
    /// Create a conflict error from a list of keys.
    pub fn conflict(keys: Vec<String>) -> Self {
        Self::Conflict { keys }
    }
}

impl Transient for ResourceError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            ResourceError::Conflict { .. }
                | ResourceError::Deadlock { .. }
                | ResourceError::SerializationFailure
                | ResourceError::ConnectionLost(_)
        )
    }
}

/// Errors surfaced by the transaction engine.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Failure reported by the underlying resource.
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    /// The effective timeout elapsed before the unit of work finished.
    #[error("transaction timed out after {}ms", elapsed.as_millis())]
    Timeout { elapsed: Duration },

    /// The caller cancelled the unit of work.
    #[error("transaction cancelled by caller")]
    Cancelled,

    /// Failure raised by caller-supplied logic.
    #[error("{0}")]
    Business(#[source] BoxError),
}

impl TransactionError {
    /// Wrap a caller-side failure.
    pub fn business<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Business(err.into())
    }

    /// True for timeout and cancellation.
    pub fn is_deadline(&self) -> bool {
        matches!(
            self,
            TransactionError::Timeout { .. } | TransactionError::Cancelled
        )
    }
}

impl Transient for TransactionError {
    fn is_transient(&self) -> bool {
        match self {
            TransactionError::Resource(err) => err.is_transient(),
            _ => false,
        }
    }
}
