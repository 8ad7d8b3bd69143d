//! Errors for the notes service.

use thiserror::Error;

use crate::notes::model::NoteId;
use crate::transaction::{ResourceError, TransactionError, Transient};

/// Result type for notes operations.
pub type NoteResult<T> = Result<T, NoteError>;

#[derive(Debug, Error)]
pub enum NoteError {
    #[error("note not found: {0}")]
    NotFound(NoteId),

    #[error("invalid note: {0}")]
    Validation(String),

    #[error("stored note is malformed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl From<ResourceError> for NoteError {
    fn from(err: ResourceError) -> Self {
        NoteError::Transaction(TransactionError::Resource(err))
    }
}

impl Transient for NoteError {
    fn is_transient(&self) -> bool {
        match self {
            NoteError::Transaction(err) => err.is_transient(),
            _ => false,
        }
    }
}
