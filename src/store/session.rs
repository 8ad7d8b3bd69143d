//! Sessions on the in-memory store.
//!
//! A session holds at most one open transaction. Writes are buffered as
//! pending changes; [`Session::persist_pending_changes`] moves them into the
//! staged write set, and only staged changes are applied on commit. A
//! session's own reads see its staged and pending changes.
//!
//! `read uncommitted` behaves like `read committed`, since nothing is shared
//! between sessions before commit. `repeatable read` and `serializable` read
//! from the snapshot taken at `begin`; `serializable` also validates the
//! documents it read when committing.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::store::memory::{Docs, DocumentStore, FaultPoint};
use crate::store::types::{Collection, DocKey, DocPath};
use crate::transaction::{IsolationLevel, ResourceError, Session};

/// Read operations available to every participant.
#[async_trait]
pub trait DocumentRead: Send + Sync {
    /// Fetch one document.
    async fn get(&self, collection: &Collection, key: &DocKey)
        -> Result<Option<Value>, ResourceError>;

    /// All documents in a collection, ordered by key.
    async fn scan(&self, collection: &Collection) -> Result<Vec<(DocKey, Value)>, ResourceError>;
}

/// Write operations, only reachable through a write participant.
#[async_trait]
pub trait DocumentWrite: DocumentRead {
    /// Insert or replace a document.
    async fn put(&self, collection: &Collection, key: &DocKey, value: Value)
        -> Result<(), ResourceError>;

    /// Delete a document. Returns whether it existed.
    async fn delete(&self, collection: &Collection, key: &DocKey) -> Result<bool, ResourceError>;
}

#[derive(Debug)]
struct OpenTx {
    isolation: IsolationLevel,
    base_seq: u64,
    snapshot: Docs,
    pending: BTreeMap<DocPath, Option<Value>>,
    staged: BTreeMap<DocPath, Option<Value>>,
    reads: BTreeSet<DocPath>,
}

impl OpenTx {
    /// Own changes first, newest layer first.
    fn local(&self, path: &DocPath) -> Option<&Option<Value>> {
        self.pending.get(path).or_else(|| self.staged.get(path))
    }
}

/// One connection to a [`DocumentStore`].
#[derive(Debug)]
pub struct StoreSession {
    id: String,
    store: DocumentStore,
    tx: Mutex<Option<OpenTx>>,
}

impl StoreSession {
    pub(crate) fn new(store: DocumentStore) -> Self {
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            store,
            tx: Mutex::new(None),
        }
    }

    /// True while a transaction is open.
    pub fn is_open(&self) -> bool {
        self.tx.lock().is_some()
    }

    fn not_active(&self) -> ResourceError {
        ResourceError::NotActive {
            session: self.id.clone(),
        }
    }

    /// Base documents visible under the transaction's isolation level.
    fn base_view(&self, tx: &OpenTx) -> Docs {
        if tx.isolation.uses_snapshot() {
            tx.snapshot.clone()
        } else {
            self.store.latest()
        }
    }
}

impl Drop for StoreSession {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.get_mut().take() {
            self.store.close_snapshot(tx.base_seq);
        }
    }
}

#[async_trait]
impl DocumentRead for StoreSession {
    async fn get(
        &self,
        collection: &Collection,
        key: &DocKey,
    ) -> Result<Option<Value>, ResourceError> {
        let mut guard = self.tx.lock();
        let tx = guard.as_mut().ok_or_else(|| self.not_active())?;
        let path = DocPath::new(collection.clone(), key.clone());

        if let Some(local) = tx.local(&path) {
            return Ok(local.clone());
        }

        let value = self
            .base_view(tx)
            .get(&path)
            .and_then(|v| v.value.clone());
        tx.reads.insert(path);
        Ok(value)
    }

    async fn scan(&self, collection: &Collection) -> Result<Vec<(DocKey, Value)>, ResourceError> {
        let mut guard = self.tx.lock();
        let tx = guard.as_mut().ok_or_else(|| self.not_active())?;

        let mut merged: BTreeMap<DocKey, Option<Value>> = BTreeMap::new();
        for (path, versioned) in self.base_view(tx).iter() {
            if &path.collection == collection {
                merged.insert(path.key.clone(), versioned.value.clone());
                tx.reads.insert(path.clone());
            }
        }
        for layer in [&tx.staged, &tx.pending] {
            for (path, value) in layer.iter() {
                if &path.collection == collection {
                    merged.insert(path.key.clone(), value.clone());
                }
            }
        }

        Ok(merged
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect())
    }
}

#[async_trait]
impl DocumentWrite for StoreSession {
    async fn put(
        &self,
        collection: &Collection,
        key: &DocKey,
        value: Value,
    ) -> Result<(), ResourceError> {
        let mut guard = self.tx.lock();
        let tx = guard.as_mut().ok_or_else(|| self.not_active())?;
        tx.pending
            .insert(DocPath::new(collection.clone(), key.clone()), Some(value));
        Ok(())
    }

    async fn delete(&self, collection: &Collection, key: &DocKey) -> Result<bool, ResourceError> {
        let existed = self.get(collection, key).await?.is_some();
        let mut guard = self.tx.lock();
        let tx = guard.as_mut().ok_or_else(|| self.not_active())?;
        tx.pending
            .insert(DocPath::new(collection.clone(), key.clone()), None);
        Ok(existed)
    }
}

#[async_trait]
impl Session for StoreSession {
    type Reader = dyn DocumentRead;
    type Writer = dyn DocumentWrite;

    fn id(&self) -> &str {
        &self.id
    }

    fn reader(&self) -> &Self::Reader {
        self
    }

    fn writer(&self) -> &Self::Writer {
        self
    }

    async fn begin(&self, isolation: IsolationLevel) -> Result<(), ResourceError> {
        if self.store.take_fault(FaultPoint::Begin) {
            return Err(ResourceError::ConnectionLost(format!(
                "injected fault while beginning in session {}",
                self.id
            )));
        }

        let mut guard = self.tx.lock();
        if guard.is_some() {
            return Err(ResourceError::Internal(format!(
                "session {} already has an open transaction",
                self.id
            )));
        }

        let committed = self.store.open_snapshot();
        *guard = Some(OpenTx {
            isolation,
            base_seq: committed.seq,
            snapshot: committed.docs,
            pending: BTreeMap::new(),
            staged: BTreeMap::new(),
            reads: BTreeSet::new(),
        });
        self.store.record_begin();
        trace!(session = %self.id, %isolation, base = committed.seq, "begin");
        Ok(())
    }

    async fn commit(&self) -> Result<(), ResourceError> {
        let tx = self.tx.lock().take().ok_or_else(|| self.not_active())?;
        let base_seq = tx.base_seq;

        if self.store.take_fault(FaultPoint::Commit) {
            self.store.close_snapshot(base_seq);
            self.store.record_conflict();
            return Err(ResourceError::conflict(vec![format!(
                "injected conflict in session {}",
                self.id
            )]));
        }

        let reads: Vec<DocPath> = if tx.isolation == IsolationLevel::Serializable {
            tx.reads.into_iter().collect()
        } else {
            Vec::new()
        };
        let applied = self.store.apply(base_seq, tx.staged, &reads);
        self.store.close_snapshot(base_seq);
        let seq = applied?;
        trace!(session = %self.id, seq, "commit");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), ResourceError> {
        if let Some(tx) = self.tx.lock().take() {
            self.store.close_snapshot(tx.base_seq);
            self.store.record_rollback();
            trace!(session = %self.id, "rollback");
        }
        Ok(())
    }

    async fn persist_pending_changes(&self) -> Result<(), ResourceError> {
        let mut guard = self.tx.lock();
        let tx = guard.as_mut().ok_or_else(|| self.not_active())?;
        let pending = std::mem::take(&mut tx.pending);
        tx.staged.extend(pending);
        Ok(())
    }
}
