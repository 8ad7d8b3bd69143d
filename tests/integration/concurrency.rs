//! Concurrent units of work against one store

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use txguard::config::TxConfig;
use txguard::notes::repository::{get_note, insert_note, update_note};
use txguard::notes::{KeywordSentiment, Note, NoteError, NoteService};
use txguard::store::DocumentStore;
use txguard::transaction::{stack, CallStack, FrameId, ReadParticipant, TransactionEngine};

fn engine() -> TransactionEngine<DocumentStore> {
    TransactionEngine::new(
        DocumentStore::new(),
        TxConfig {
            retry_count: Some(50),
            retry_backoff: Some(Duration::from_millis(1)),
            ..TxConfig::default()
        },
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contending_writers_all_succeed_through_retries() {
    let engine = engine();
    let note = Note::new("Counter", "0").unwrap();
    let seed = &note;
    engine
        .write(|tx| async move { insert_note(&tx, seed).await })
        .await
        .unwrap();

    let id = note.id;
    let tasks = (0..8).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .write(|tx| async move {
                    let mut current = get_note(&tx, &id).await?.ok_or(NoteError::NotFound(id))?;
                    let count: u32 = current.body.parse().unwrap_or(0);
                    tokio::task::yield_now().await;
                    current.body = (count + 1).to_string();
                    update_note(&tx, &current).await
                })
                .await
        })
    });

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let final_note = engine
        .read(|tx| async move { get_note(&tx, &id).await })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(final_note.body, "8");

    let stats = engine.provider().stats();
    assert_eq!(stats.commits, 9);
    assert_eq!(stats.begins, stats.commits + stats.rollbacks + stats.conflicts);
}

#[tokio::test]
async fn test_plain_spawn_inside_write_starts_new_root() {
    let engine = engine();

    let inner_id = engine
        .write(|_tx| {
            let engine = engine.clone();
            async move {
                assert_eq!(stack::depth(), 1);

                // Not a descendant: may open its own write transaction.
                let handle = tokio::spawn(async move {
                    assert!(!stack::in_transaction());
                    let inner = Note::new("Inner", "").unwrap();
                    let stored = &inner;
                    engine
                        .write(|tx| async move { insert_note(&tx, stored).await })
                        .await?;
                    Ok::<_, NoteError>(inner.id)
                });
                handle.await.map_err(|e| NoteError::Validation(e.to_string()))?
            }
        })
        .await
        .unwrap();

    let stored = engine
        .read(|tx| async move { get_note(&tx, &inner_id).await })
        .await
        .unwrap();
    assert!(stored.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_keep_titles_unique() {
    let service = NoteService::new(engine(), Arc::new(KeywordSentiment::new(Duration::ZERO)));

    let tasks = (0..16).map(|i| {
        let service = service.clone();
        tokio::spawn(async move { service.create("Same", &i.to_string()).await })
    });

    let mut created = 0;
    let mut rejected = 0;
    for result in join_all(tasks).await {
        match result.unwrap() {
            Ok(_) => created += 1,
            Err(NoteError::Validation(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(rejected, 15);
    assert_eq!(service.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_descendant_task_sees_enclosing_frame() {
    let engine = engine();

    let (outer_frame, seen) = engine
        .read(|tx| async move {
            let outer_frame = tx.frame().id();
            let seen = stack::spawn(async { top_frame() })
                .await
                .map_err(|e| NoteError::Validation(e.to_string()))?;
            Ok::<_, NoteError>((outer_frame, seen))
        })
        .await
        .unwrap();

    assert_eq!(seen, Some(outer_frame));
}

#[tokio::test]
async fn test_descendant_write_inside_write_panics() {
    let engine = engine();

    let handle = tokio::spawn({
        let engine = engine.clone();
        async move {
            engine
                .write(|_tx| {
                    let engine = engine.clone();
                    async move {
                        let nested = stack::spawn(async move {
                            engine
                                .write(|_tx| async { Ok::<_, NoteError>(()) })
                                .await
                        });
                        match nested.await {
                            Ok(result) => result,
                            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                            Err(e) => Err(NoteError::Validation(e.to_string())),
                        }
                    }
                })
                .await
        }
    });

    assert!(handle.await.unwrap_err().is_panic());
    assert_eq!(engine.provider().stats().commits, 0);
}

fn top_frame() -> Option<FrameId> {
    CallStack::current().peek().map(|frame| frame.id())
}
