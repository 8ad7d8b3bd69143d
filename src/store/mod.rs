//! In-memory document store used as the transactional resource.
//!
//! It stands in for a database session: it supports isolation levels,
//! buffered writes, first-committer-wins conflict detection and fault
//! injection, which is all the transaction engine needs to exercise.
//!
//! # Usage
//!
//! ```ignore
//! use txguard::store::{Collection, DocKey, DocumentStore};
//! use txguard::transaction::TransactionEngine;
//!
//! let engine = TransactionEngine::new(DocumentStore::new(), Default::default());
//! let notes = Collection::new("notes")?;
//!
//! engine.write(|tx| async move {
//!     tx.writer().put(&notes, &DocKey::generate(), json!({"title": "hi"})).await?;
//!     Ok::<_, TransactionError>(())
//! }).await?;
//! ```

mod memory;
mod session;
mod types;

pub use memory::{DocumentStore, FaultPoint, StoreStats};
pub use session::{DocumentRead, DocumentWrite, StoreSession};
pub use types::{Collection, DocKey, DocPath, InvalidNameError};
