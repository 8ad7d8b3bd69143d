//! Note operations, each one unit of work or a short chain of them.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::TxConfig;
use crate::notes::error::{NoteError, NoteResult};
use crate::notes::model::{Note, NoteId, Sentiment};
use crate::notes::repository::{
    delete_note, get_note, insert_note, list_notes, search_notes, update_note,
};
use crate::notes::sentiment::{KeywordSentiment, SentimentAnalyzer};
use crate::store::DocumentStore;
use crate::transaction::{assert_never, TransactionEngine};

/// Entry point for everything the REPL does with notes.
#[derive(Clone)]
pub struct NoteService {
    engine: TransactionEngine<DocumentStore>,
    analyzer: Arc<dyn SentimentAnalyzer>,
}

impl NoteService {
    pub fn new(
        engine: TransactionEngine<DocumentStore>,
        analyzer: Arc<dyn SentimentAnalyzer>,
    ) -> Self {
        Self { engine, analyzer }
    }

    /// Service over a fresh in-memory store with the keyword analyzer.
    pub fn in_memory(config: TxConfig) -> Self {
        Self::new(
            TransactionEngine::new(DocumentStore::new(), config),
            Arc::new(KeywordSentiment::default()),
        )
    }

    pub fn engine(&self) -> &TransactionEngine<DocumentStore> {
        &self.engine
    }

    /// Create a note. Titles are unique, ignoring case.
    pub async fn create(&self, title: &str, body: &str) -> NoteResult<Note> {
        let note = Note::new(title, body)?;

        let candidate = &note;
        self.engine
            .write(|tx| async move { insert_note(&tx, candidate).await })
            .await?;

        info!(id = %note.id, "note created");
        Ok(note)
    }

    pub async fn get(&self, id: NoteId) -> NoteResult<Note> {
        self.engine
            .read(|tx| async move { get_note(&tx, &id).await?.ok_or(NoteError::NotFound(id)) })
            .await
    }

    pub async fn list(&self) -> NoteResult<Vec<Note>> {
        self.engine
            .read(|tx| async move { list_notes(&tx).await })
            .await
    }

    pub async fn search(&self, text: &str) -> NoteResult<Vec<Note>> {
        self.engine
            .read(|tx| async move { search_notes(&tx, text).await })
            .await
    }

    /// Change a note's title, keeping titles unique.
    pub async fn rename(&self, id: NoteId, title: &str) -> NoteResult<Note> {
        let note = self
            .engine
            .write(|tx| async move {
                let current = get_note(&tx, &id).await?.ok_or(NoteError::NotFound(id))?;
                let renamed = current.renamed(title)?;
                update_note(&tx, &renamed).await?;
                Ok::<Note, NoteError>(renamed)
            })
            .await?;

        info!(%id, "note renamed");
        Ok(note)
    }

    pub async fn delete(&self, id: NoteId) -> NoteResult<()> {
        self.engine
            .write(|tx| async move { delete_note(&tx, &id).await })
            .await?;
        info!(%id, "note deleted");
        Ok(())
    }

    /// Score a note's body and store the result.
    ///
    /// The analyzer runs between two transactions, never inside one.
    ///
    /// # Panics
    ///
    /// Through the installed guard, when called inside a transaction.
    pub async fn analyze(&self, id: NoteId) -> NoteResult<Sentiment> {
        let note = self.get(id).await?;

        assert_never();
        let sentiment = self.analyzer.analyze(&note.body).await;
        debug!(%id, score = sentiment.score, "analysis finished");

        self.engine
            .write(|tx| async move {
                // The note may have changed or gone while the analyzer ran.
                let current = get_note(&tx, &id).await?.ok_or(NoteError::NotFound(id))?;
                update_note(&tx, &current.with_sentiment(sentiment)).await
            })
            .await?;

        info!(%id, label = %sentiment.label, "note analyzed");
        Ok(sentiment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::notes::model::SentimentLabel;
    use crate::store::FaultPoint;

    fn service() -> NoteService {
        service_with(TxConfig::default())
    }

    fn service_with(config: TxConfig) -> NoteService {
        NoteService::new(
            TransactionEngine::new(DocumentStore::new(), config),
            Arc::new(KeywordSentiment::new(Duration::ZERO)),
        )
    }

    #[tokio::test]
    async fn test_create_get_list() {
        let service = service();
        let note = service.create("Groceries", "milk").await.unwrap();

        assert_eq!(service.get(note.id).await.unwrap(), note);
        assert_eq!(service.list().await.unwrap(), vec![note]);
    }

    #[tokio::test]
    async fn test_duplicate_title_rolls_back() {
        let service = service();
        service.create("Groceries", "milk").await.unwrap();

        let err = service.create("groceries", "eggs").await.unwrap_err();
        assert!(matches!(err, NoteError::Validation(_)));
        assert_eq!(service.list().await.unwrap().len(), 1);

        let stats = service.engine().provider().stats();
        assert_eq!(stats.commits, 1);
    }

    #[tokio::test]
    async fn test_get_missing_note() {
        let service = service();
        let id = NoteId::generate();
        let err = service.get(id).await.unwrap_err();
        assert!(matches!(err, NoteError::NotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn test_rename_keeps_titles_unique() {
        let service = service();
        let first = service.create("First", "").await.unwrap();
        service.create("Second", "").await.unwrap();

        let renamed = service.rename(first.id, "Primary").await.unwrap();
        assert_eq!(renamed.title, "Primary");
        assert_eq!(service.get(first.id).await.unwrap().title, "Primary");

        let err = service.rename(first.id, "second").await.unwrap_err();
        assert!(matches!(err, NoteError::Validation(_)));

        // Renaming to its own title with different case is fine.
        service.rename(first.id, "PRIMARY").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete() {
        let service = service();
        let note = service.create("Temp", "").await.unwrap();
        service.delete(note.id).await.unwrap();

        assert!(service.list().await.unwrap().is_empty());
        assert!(matches!(
            service.delete(note.id).await,
            Err(NoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_search() {
        let service = service();
        service.create("Lisbon", "pack sunscreen").await.unwrap();
        service.create("Porto", "book dinner").await.unwrap();

        let hits = service.search("SUN").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Lisbon");
    }

    #[tokio::test]
    async fn test_analyze_stores_sentiment() {
        let service = service();
        let note = service
            .create("Holiday", "great weather, happy kids")
            .await
            .unwrap();

        let sentiment = service.analyze(note.id).await.unwrap();
        assert_eq!(sentiment.label, SentimentLabel::Positive);
        assert_eq!(service.get(note.id).await.unwrap().sentiment, Some(sentiment));
    }

    #[tokio::test]
    async fn test_analyze_inside_transaction_panics() {
        let service = service();
        let note = service.create("Holiday", "fun").await.unwrap();

        let handle = tokio::spawn(async move {
            let inner = service.clone();
            service
                .engine()
                .read(|_tx| {
                    let inner = inner.clone();
                    async move { inner.analyze(note.id).await }
                })
                .await
        });

        let err = handle.await.unwrap_err();
        assert!(err.is_panic());
    }

    #[tokio::test]
    async fn test_transient_conflict_is_retried() {
        let service = service_with(TxConfig {
            retry_backoff: Some(Duration::from_millis(1)),
            ..TxConfig::default()
        });
        service
            .engine()
            .provider()
            .inject_fault(FaultPoint::Commit, 2);

        let note = service.create("Retried", "").await.unwrap();
        assert_eq!(service.get(note.id).await.unwrap().title, "Retried");
        assert_eq!(service.engine().provider().stats().conflicts, 2);
    }

    #[tokio::test]
    async fn test_forced_retries_leave_single_note() {
        let service = service_with(TxConfig {
            test_retries: 3,
            ..TxConfig::default()
        });

        service.create("Once", "").await.unwrap();
        assert_eq!(service.list().await.unwrap().len(), 1);
    }
}
