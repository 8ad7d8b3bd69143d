//! The shared, committed state of the in-memory store.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use crate::store::session::StoreSession;
use crate::store::types::{Collection, DocPath};
use crate::transaction::{ResourceError, ResourceProvider};

/// One committed version of a document. `value == None` is a tombstone.
#[derive(Debug, Clone)]
pub(crate) struct Versioned {
    pub value: Option<Value>,
    pub version: u64,
}

pub(crate) type Docs = im::OrdMap<DocPath, Versioned>;

/// Committed state. `seq` is the number of the last commit.
#[derive(Debug, Clone, Default)]
pub(crate) struct Committed {
    pub seq: u64,
    pub docs: Docs,
}

/// Where an injected fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// `acquire` fails with `ConnectionLost`.
    Acquire,
    /// `begin` fails with `ConnectionLost`.
    Begin,
    /// `commit` fails with `Conflict`.
    Commit,
}

/// Counters for what the store has been asked to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub sessions: u64,
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub conflicts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sessions: AtomicU64,
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    conflicts: AtomicU64,
}

#[derive(Debug, Default)]
struct StoreInner {
    state: RwLock<Committed>,
    /// Base sequence of every open transaction, with a count per sequence.
    open: Mutex<BTreeMap<u64, usize>>,
    /// Tombstones in commit order. Only touched under the `state` write lock.
    tombstones: Mutex<VecDeque<(u64, DocPath)>>,
    faults: Mutex<HashMap<FaultPoint, u32>>,
    counters: Counters,
}

/// In-memory multi-version document store.
///
/// Thread-safe: clones share the same data (uses Arc internally). Every
/// [`ResourceProvider::acquire`] returns a new [`StoreSession`].
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations at `point` fail.
    pub fn inject_fault(&self, point: FaultPoint, count: u32) {
        *self.inner.faults.lock().entry(point).or_insert(0) += count;
    }

    /// Consume one pending fault at `point`, if any.
    pub(crate) fn take_fault(&self, point: FaultPoint) -> bool {
        let mut faults = self.inner.faults.lock();
        match faults.get_mut(&point) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn stats(&self) -> StoreStats {
        let c = &self.inner.counters;
        StoreStats {
            sessions: c.sessions.load(Ordering::SeqCst),
            begins: c.begins.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            rollbacks: c.rollbacks.load(Ordering::SeqCst),
            conflicts: c.conflicts.load(Ordering::SeqCst),
        }
    }

    /// Number of the last commit.
    pub fn head(&self) -> u64 {
        self.inner.state.read().seq
    }

    /// Committed value of a document, outside any transaction.
    pub fn committed(&self, path: &DocPath) -> Option<Value> {
        self.inner
            .state
            .read()
            .docs
            .get(path)
            .and_then(|v| v.value.clone())
    }

    /// Number of live committed documents in a collection.
    pub fn count(&self, collection: &Collection) -> usize {
        self.inner
            .state
            .read()
            .docs
            .iter()
            .filter(|(path, v)| &path.collection == collection && v.value.is_some())
            .count()
    }

    /// Number of tombstones still held in the committed state.
    pub fn tombstones(&self) -> usize {
        self.inner
            .state
            .read()
            .docs
            .values()
            .filter(|v| v.value.is_none())
            .count()
    }

    /// Snapshot the committed state for a new transaction and register its
    /// base sequence, atomically with respect to commits.
    pub(crate) fn open_snapshot(&self) -> Committed {
        let state = self.inner.state.read();
        *self.inner.open.lock().entry(state.seq).or_insert(0) += 1;
        state.clone()
    }

    /// Release a base sequence registered by [`DocumentStore::open_snapshot`].
    pub(crate) fn close_snapshot(&self, base_seq: u64) {
        let mut open = self.inner.open.lock();
        if let Some(count) = open.get_mut(&base_seq) {
            *count -= 1;
            if *count == 0 {
                open.remove(&base_seq);
            }
        }
    }

    pub(crate) fn latest(&self) -> Docs {
        self.inner.state.read().docs.clone()
    }

    pub(crate) fn record_begin(&self) {
        self.inner.counters.begins.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_rollback(&self) {
        self.inner.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
    }

    /// Apply `writes` atomically if nothing in `writes` (or `reads`) was
    /// committed by someone else after `base_seq`. First committer wins.
    pub(crate) fn apply(
        &self,
        base_seq: u64,
        writes: impl IntoIterator<Item = (DocPath, Option<Value>)>,
        reads: &[DocPath],
    ) -> Result<u64, ResourceError> {
        let writes: Vec<_> = writes.into_iter().collect();
        let mut state = self.inner.state.write();

        let changed_since = |path: &DocPath| {
            state
                .docs
                .get(path)
                .map(|v| v.version > base_seq)
                .unwrap_or(false)
        };
        let mut conflicts: Vec<String> = writes
            .iter()
            .map(|(path, _)| path)
            .chain(reads.iter())
            .filter(|path| changed_since(path))
            .map(|path| path.to_string())
            .collect();
        conflicts.sort();
        conflicts.dedup();

        if !conflicts.is_empty() {
            self.inner.counters.conflicts.fetch_add(1, Ordering::SeqCst);
            return Err(ResourceError::conflict(conflicts));
        }

        if writes.is_empty() {
            self.inner.counters.commits.fetch_add(1, Ordering::SeqCst);
            return Ok(state.seq);
        }

        state.seq += 1;
        let version = state.seq;
        let mut tombstones = self.inner.tombstones.lock();
        for (path, value) in writes {
            if value.is_none() {
                tombstones.push_back((version, path.clone()));
            }
            state.docs.insert(path, Versioned { value, version });
        }

        // A tombstone only matters to transactions that began before it.
        let horizon = self
            .inner
            .open
            .lock()
            .keys()
            .next()
            .copied()
            .unwrap_or(version);
        while tombstones.front().map_or(false, |(at, _)| *at <= horizon) {
            let Some((deleted_at, path)) = tombstones.pop_front() else {
                break;
            };
            let stale = state
                .docs
                .get(&path)
                .map(|v| v.value.is_none() && v.version == deleted_at)
                .unwrap_or(false);
            if stale {
                state.docs.remove(&path);
            }
        }
        self.inner.counters.commits.fetch_add(1, Ordering::SeqCst);
        debug!(seq = version, "store commit applied");
        Ok(version)
    }

    pub(crate) fn record_conflict(&self) {
        self.inner.counters.conflicts.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceProvider for DocumentStore {
    type Session = StoreSession;

    async fn acquire(&self) -> Result<StoreSession, ResourceError> {
        if self.take_fault(FaultPoint::Acquire) {
            return Err(ResourceError::ConnectionLost(
                "injected fault while acquiring session".to_string(),
            ));
        }
        self.inner.counters.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(StoreSession::new(self.clone()))
    }
}
