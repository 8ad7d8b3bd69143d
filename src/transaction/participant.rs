//! Capability-coloured handles to an open transaction.
//!
//! Code that may only read takes `&impl ReadParticipant`; code that may also
//! write takes `&impl WriteParticipant`. Because `WriteParticipant` extends
//! `ReadParticipant`, a write handle can be passed anywhere a read handle is
//! accepted, while the reverse does not compile:
//!
//! ```compile_fail
//! use txguard::store::StoreSession;
//! use txguard::transaction::{ReadTx, WriteParticipant};
//!
//! async fn persist(tx: &impl WriteParticipant) {
//!     tx.persist().await.unwrap();
//! }
//!
//! async fn misuse(tx: ReadTx<StoreSession>) {
//!     persist(&tx).await;
//! }
//! ```
//!
//! Both handle types wrap the same frame and session; the distinction exists
//! only in the types.

use std::sync::Arc;

use async_trait::async_trait;

use crate::transaction::error::ResourceError;
use crate::transaction::resource::Session;
use crate::transaction::stack::Frame;

/// Read access to the transaction's resource.
pub trait ReadParticipant: Send + Sync {
    type Session: Session;

    /// The frame of the attempt this handle belongs to.
    fn frame(&self) -> &Frame;

    /// Read-only view of the session.
    fn reader(&self) -> &<Self::Session as Session>::Reader;
}

/// Read and write access to the transaction's resource.
#[async_trait]
pub trait WriteParticipant: ReadParticipant {
    /// Writable view of the session.
    fn writer(&self) -> &<Self::Session as Session>::Writer;

    /// Flush pending changes into the transaction ahead of commit.
    async fn persist(&self) -> Result<(), ResourceError>;
}

/// Handle passed to read-only units of work.
pub struct ReadTx<S: Session> {
    pub(crate) session: Arc<S>,
    frame: Arc<Frame>,
}

impl<S: Session> ReadTx<S> {
    pub(crate) fn new(session: Arc<S>, frame: Arc<Frame>) -> Self {
        Self { session, frame }
    }
}

impl<S: Session> Clone for ReadTx<S> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            frame: Arc::clone(&self.frame),
        }
    }
}

impl<S: Session> std::fmt::Debug for ReadTx<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadTx")
            .field("session", &self.session.id())
            .field("frame", &self.frame.id())
            .finish()
    }
}

impl<S: Session> ReadParticipant for ReadTx<S> {
    type Session = S;

    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn reader(&self) -> &S::Reader {
        self.session.reader()
    }
}

/// Handle passed to read-write units of work.
pub struct WriteTx<S: Session> {
    read: ReadTx<S>,
}

impl<S: Session> WriteTx<S> {
    pub(crate) fn new(session: Arc<S>, frame: Arc<Frame>) -> Self {
        Self {
            read: ReadTx::new(session, frame),
        }
    }

    /// Narrow to a read-only handle, e.g. to call a read-only helper that is
    /// written against the concrete `ReadTx` type.
    pub fn as_read(&self) -> &ReadTx<S> {
        &self.read
    }
}

impl<S: Session> Clone for WriteTx<S> {
    fn clone(&self) -> Self {
        Self {
            read: self.read.clone(),
        }
    }
}

impl<S: Session> std::fmt::Debug for WriteTx<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTx")
            .field("session", &self.read.session.id())
            .field("frame", &self.read.frame.id())
            .finish()
    }
}

impl<S: Session> ReadParticipant for WriteTx<S> {
    type Session = S;

    fn frame(&self) -> &Frame {
        self.read.frame()
    }

    fn reader(&self) -> &S::Reader {
        self.read.reader()
    }
}

#[async_trait]
impl<S: Session> WriteParticipant for WriteTx<S> {
    fn writer(&self) -> &S::Writer {
        self.read.session.writer()
    }

    async fn persist(&self) -> Result<(), ResourceError> {
        self.read.session.persist_pending_changes().await
    }
}
