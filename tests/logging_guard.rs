//! Behaviour with the logging guard installed.
//!
//! Installing a guard is process-wide, so these tests get their own binary.

use std::sync::{Arc, Once};
use std::time::Duration;

use txguard::config::TxConfig;
use txguard::notes::repository::insert_note;
use txguard::notes::{KeywordSentiment, Note, NoteError, NoteService};
use txguard::store::DocumentStore;
use txguard::transaction::{
    assert_never, install_guard, stack, LoggingGuard, StrictGuard, TransactionEngine,
};

static INSTALL: Once = Once::new();

fn install() {
    INSTALL.call_once(|| {
        install_guard(LoggingGuard).unwrap();
    });
}

fn service() -> NoteService {
    NoteService::new(
        TransactionEngine::new(DocumentStore::new(), TxConfig::default()),
        Arc::new(KeywordSentiment::new(Duration::ZERO)),
    )
}

#[test]
fn test_second_install_is_rejected() {
    install();
    assert!(install_guard(StrictGuard).is_err());
}

#[tokio::test]
async fn test_violations_are_logged_not_fatal() {
    install();
    let service = service();
    let engine = service.engine().clone();

    let note = Note::new("Nested", "").unwrap();
    let stored = &note;
    engine
        .write(|_tx| {
            let engine = engine.clone();
            async move {
                assert_never();
                assert_eq!(stack::depth(), 1);

                // Write inside write proceeds on its own session.
                engine
                    .write(|tx| async move { insert_note(&tx, stored).await })
                    .await?;
                assert_eq!(stack::depth(), 1);
                Ok::<_, NoteError>(())
            }
        })
        .await
        .unwrap();

    assert_eq!(service.get(note.id).await.unwrap().title, "Nested");
}

#[tokio::test]
async fn test_analyze_inside_transaction_still_completes() {
    install();
    let service = service();
    let note = service.create("Mood", "happy").await.unwrap();

    let inner = service.clone();
    let sentiment = service
        .engine()
        .read(|_tx| {
            let inner = inner.clone();
            async move { inner.analyze(note.id).await }
        })
        .await
        .unwrap();
    assert_eq!(sentiment.score, 1);
}
