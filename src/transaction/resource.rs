//! The transactional resource the engine drives.
//!
//! A provider hands out sessions; a session runs at most one transaction at
//! a time. The engine never reuses a session across attempts.

use async_trait::async_trait;

use crate::transaction::error::ResourceError;
use crate::transaction::isolation::IsolationLevel;

/// Source of fresh sessions.
#[async_trait]
pub trait ResourceProvider: Send + Sync + 'static {
    type Session: Session;

    /// Acquire a new session, never one handed out before.
    async fn acquire(&self) -> Result<Self::Session, ResourceError>;
}

/// One exclusively owned connection to the resource.
///
/// `Reader` and `Writer` are the views participants hand to caller code.
/// `Writer` must expose at least everything `Reader` does; typically they are
/// trait objects where the writer trait extends the reader trait.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    type Reader: ?Sized + Send + Sync;
    type Writer: ?Sized + Send + Sync;

    /// Identifier used in frames and log events.
    fn id(&self) -> &str;

    fn reader(&self) -> &Self::Reader;

    fn writer(&self) -> &Self::Writer;

    async fn begin(&self, isolation: IsolationLevel) -> Result<(), ResourceError>;

    async fn commit(&self) -> Result<(), ResourceError>;

    /// Discard the open transaction. A no-op when none is open.
    async fn rollback(&self) -> Result<(), ResourceError>;

    /// Flush buffered changes into the open transaction.
    async fn persist_pending_changes(&self) -> Result<(), ResourceError>;
}
