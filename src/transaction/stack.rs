//! Per-call-chain record of open transaction frames.
//!
//! The stack is a persistent vector held in a tokio task-local. Pushing
//! produces a new stack value that is installed only for the future doing
//! the push, so concurrently running siblings, including futures joined in
//! the same task, keep seeing the stack they started with.
//!
//! Task-locals are not inherited by `tokio::spawn`. Use [`spawn`] (or wrap
//! the future with [`inherit`]) when a spawned task should count as a
//! descendant of the current call chain; a plain `tokio::spawn` is a new root.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::transaction::isolation::IsolationLevel;
use crate::transaction::options::EffectiveOptions;

tokio::task_local! {
    static CALL_STACK: CallStack;
}

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame-{}", self.0)
    }
}

/// One attempt of one transactional call.
#[derive(Debug)]
pub struct Frame {
    id: FrameId,
    session: String,
    options: EffectiveOptions,
    read_only: bool,
    attempt: u32,
}

impl Frame {
    pub fn new(
        session: impl Into<String>,
        options: EffectiveOptions,
        read_only: bool,
        attempt: u32,
    ) -> Self {
        Self {
            id: FrameId(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed)),
            session: session.into(),
            options,
            read_only,
            attempt,
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Identifier of the session this attempt owns.
    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn options(&self) -> &EffectiveOptions {
        &self.options
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.options.isolation
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// 1-based attempt number within its call.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Immutable stack of frames; clones share structure.
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: im::Vector<Arc<Frame>>,
}

impl CallStack {
    /// The stack visible to the running future, empty at a root.
    pub fn current() -> CallStack {
        CALL_STACK.try_with(|stack| stack.clone()).unwrap_or_default()
    }

    /// A new stack with `frame` on top. `self` is left untouched.
    pub fn push(&self, frame: Arc<Frame>) -> CallStack {
        let mut frames = self.frames.clone();
        frames.push_back(frame);
        CallStack { frames }
    }

    /// A new stack without its top frame.
    ///
    /// # Panics
    ///
    /// When the stack is empty or its top is not `frame`. Either means the
    /// call-chain bookkeeping is corrupt.
    pub fn pop(&self, frame: &Frame) -> CallStack {
        let mut frames = self.frames.clone();
        match frames.pop_back() {
            Some(top) if top.id() == frame.id() => CallStack { frames },
            Some(top) => panic!(
                "call stack corrupted: popping {} but top is {}",
                frame.id(),
                top.id()
            ),
            None => panic!("call stack corrupted: popping {} from empty stack", frame.id()),
        }
    }

    /// The innermost frame, if any.
    pub fn peek(&self) -> Option<Arc<Frame>> {
        self.frames.back().cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Frames from outermost to innermost.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Frame>> {
        self.frames.iter()
    }

    /// Run `fut` with this stack as its visible stack.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CALL_STACK.scope(self, fut).await
    }
}

/// Depth of the current stack.
pub fn depth() -> usize {
    CallStack::current().depth()
}

/// True when the current call chain has an open transaction.
pub fn in_transaction() -> bool {
    !CallStack::current().is_empty()
}

/// Wrap `fut` so it sees the caller's current stack wherever it is polled.
pub fn inherit<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    CALL_STACK.scope(CallStack::current(), fut)
}

/// Spawn a task that is a descendant of the current call chain.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(inherit(fut))
}
