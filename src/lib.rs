//! txguard - capability-coloured transaction coordination
//!
//! Units of work are typed by what they may do: read-only code receives a
//! read participant, read-write code a write participant, and the write API
//! is simply absent from the former. A per-task call stack tracks open
//! transactions so unsafe nestings are refused before touching a resource,
//! and the engine retries transient failures within a timeout.
//!
//! # Example
//!
//! ```no_run
//! use txguard::config::TxConfig;
//! use txguard::notes::{NoteError, NoteService};
//!
//! # async fn demo() -> Result<(), NoteError> {
//! let service = NoteService::in_memory(TxConfig::default());
//! let note = service.create("Groceries", "milk, eggs").await?;
//! let sentiment = service.analyze(note.id).await?;
//! println!("{}", sentiment.label);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod notes;
pub mod repl;
pub mod store;
pub mod transaction;
