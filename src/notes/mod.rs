//! Notes: a small application built on the transaction engine.
//!
//! Storage functions in [`repository`] are coloured by participant type, so
//! a read-only function cannot reach the write API. [`NoteService`] composes
//! them into units of work and keeps the slow sentiment analysis outside
//! every transaction.

mod error;
mod model;
pub mod repository;
mod sentiment;
mod service;

pub use error::{NoteError, NoteResult};
pub use model::{Note, NoteId, Sentiment, SentimentLabel, MAX_TITLE_LEN};
pub use sentiment::{KeywordSentiment, SentimentAnalyzer};
pub use service::NoteService;
