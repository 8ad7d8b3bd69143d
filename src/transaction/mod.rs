//! Transaction colouring and coordination.
//!
//! Units of work are coloured by what they may do: a read-only function
//! receives a [`ReadTx`], a read-write function a [`WriteTx`]. The engine
//! tracks open transactions per call chain and refuses unsafe nestings
//! before touching the resource.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TransactionEngine                         │
//! │   (resolve options, guard, retry/timeout loop, cleanup)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │ Participant │       │  CallStack  │       │   Guard     │
//!  │ (Read/Write)│       │ (task-local)│       │ (installed) │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!                              │
//!                              ▼
//!                     ┌─────────────────┐
//!                     │ResourceProvider │
//!                     │   / Session     │
//!                     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use txguard::transaction::{TransactionEngine, WriteParticipant};
//!
//! let engine = TransactionEngine::new(store, config.transaction);
//!
//! let id = engine.write(|tx| async move {
//!     insert_note(&tx, &note).await?;
//!     Ok::<_, NoteError>(note.id)
//! }).await?;
//!
//! // Slow external calls must stay outside every transaction.
//! txguard::transaction::assert_never();
//! let score = analyzer.analyze(&body).await;
//! ```

mod cancel;
mod engine;
mod error;
pub mod guard;
mod isolation;
mod options;
mod participant;
mod resource;
pub mod stack;

pub use cancel::CancellationToken;
pub use engine::{Mode, TransactionEngine};
pub use error::{BoxError, ResourceError, TransactionError, TransactionResult, Transient};
pub use guard::{
    assert_never, assert_never_nest, install_guard, GuardAlreadyInstalled, LoggingGuard,
    NestingGuard, StrictGuard, Violation,
};
pub use isolation::IsolationLevel;
pub use options::{
    CallOptions, EffectiveOptions, DEFAULT_ISOLATION, DEFAULT_RETRY_COUNT, DEFAULT_TIMEOUT,
};
pub use participant::{ReadParticipant, ReadTx, WriteParticipant, WriteTx};
pub use resource::{ResourceProvider, Session};
pub use stack::{CallStack, Frame, FrameId};
