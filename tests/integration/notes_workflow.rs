//! End-to-end note workflows through the REPL and the service

use std::sync::Arc;
use std::time::Duration;

use txguard::config::TxConfig;
use txguard::notes::{KeywordSentiment, NoteError, NoteService, SentimentLabel};
use txguard::repl::{Repl, Reply};
use txguard::store::{DocumentStore, FaultPoint};
use txguard::transaction::{TransactionEngine, TransactionError};

fn service_with(config: TxConfig, latency: Duration) -> NoteService {
    NoteService::new(
        TransactionEngine::new(DocumentStore::new(), config),
        Arc::new(KeywordSentiment::new(latency)),
    )
}

#[tokio::test(start_paused = true)]
async fn test_slow_analysis_does_not_hit_transaction_timeout() {
    let config = TxConfig {
        default_timeout: Some(Duration::from_millis(50)),
        ..TxConfig::default()
    };
    let service = service_with(config, Duration::from_secs(2));
    let note = service
        .create("Review", "awful service, late and broken")
        .await
        .unwrap();

    let sentiment = service.analyze(note.id).await.unwrap();
    assert_eq!(sentiment.label, SentimentLabel::Negative);
    assert_eq!(
        service.get(note.id).await.unwrap().sentiment,
        Some(sentiment)
    );
}

#[tokio::test]
async fn test_note_deleted_during_analysis() {
    let service = service_with(TxConfig::default(), Duration::from_millis(50));
    let note = service.create("Short lived", "fun").await.unwrap();

    let analyzing = {
        let service = service.clone();
        tokio::spawn(async move { service.analyze(note.id).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    service.delete(note.id).await.unwrap();

    let err = analyzing.await.unwrap().unwrap_err();
    assert!(matches!(err, NoteError::NotFound(id) if id == note.id));
}

#[tokio::test]
async fn test_exhausted_retries_surface_resource_error() {
    let config = TxConfig {
        retry_count: Some(1),
        retry_backoff: Some(Duration::from_millis(1)),
        ..TxConfig::default()
    };
    let service = service_with(config, Duration::ZERO);
    service
        .engine()
        .provider()
        .inject_fault(FaultPoint::Commit, 5);

    let err = service.create("Unlucky", "").await.unwrap_err();
    assert!(matches!(
        err,
        NoteError::Transaction(TransactionError::Resource(_))
    ));
    assert_eq!(service.engine().provider().stats().conflicts, 2);
}

#[tokio::test]
async fn test_repl_script() {
    let service = service_with(TxConfig::default(), Duration::ZERO);
    let mut repl = Repl::new(service.clone());

    for line in [
        "add Groceries | milk, eggs",
        "add Weekend | great hike, happy dog",
        "add Taxes | terrible forms",
    ] {
        repl.execute_line(line).await.unwrap();
    }

    let notes = service.list().await.unwrap();
    assert_eq!(notes.len(), 3);
    let weekend = notes.iter().find(|n| n.title == "Weekend").unwrap();

    match repl
        .execute_line(&format!("analyze {}", weekend.id))
        .await
        .unwrap()
    {
        Reply::Output(text) => assert_eq!(text, "Sentiment: positive (score 2)"),
        Reply::Exit => panic!("unexpected exit"),
    }

    match repl.execute_line("find TAX").await.unwrap() {
        Reply::Output(text) => {
            assert!(text.contains("Taxes"));
            assert!(!text.contains("Weekend"));
        }
        Reply::Exit => panic!("unexpected exit"),
    }

    assert!(repl.execute_line("add groceries | dup").await.is_err());
    assert_eq!(repl.execute_line("exit").await.unwrap(), Reply::Exit);
}
