//! Transaction engine - runs units of work inside transactions.
//!
//! The engine is the main entry point. For every call it:
//! - resolves the effective options
//! - checks the nesting rules against the enclosing frame
//! - runs attempts until one commits, a non-transient error occurs, the
//!   retry budget runs out, or the deadline passes
//!
//! Each attempt acquires a fresh session, pushes a frame, begins, runs the
//! caller's function, then commits (write) or rolls back (read). Whatever
//! happens, the attempt's transaction is closed and its frame popped before
//! the next attempt starts or the call returns.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

use crate::config::TxConfig;
use crate::transaction::cancel::CancellationToken;
use crate::transaction::error::{TransactionError, Transient};
use crate::transaction::guard;
use crate::transaction::options::{CallOptions, EffectiveOptions};
use crate::transaction::participant::{ReadTx, WriteTx};
use crate::transaction::resource::{ResourceProvider, Session};
use crate::transaction::stack::{CallStack, Frame};

/// Deadline used when the timeout is too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Read-only or read-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

impl Mode {
    pub fn is_read_only(&self) -> bool {
        matches!(self, Mode::Read)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Read => write!(f, "read"),
            Mode::Write => write!(f, "write"),
        }
    }
}

/// How one attempt ended, when it did not succeed.
enum Failure<E> {
    /// Synthetic retry requested by `test_retries`.
    Forced,
    /// Error from the resource or the caller's function.
    Failed(E),
    /// Deadline or cancellation fired first.
    Interrupted(TransactionError),
}

/// Runs units of work against a [`ResourceProvider`].
///
/// Thread-safe: can be shared across tasks via Clone (uses Arc internally).
pub struct TransactionEngine<P: ResourceProvider> {
    inner: Arc<EngineInner<P>>,
}

struct EngineInner<P> {
    provider: P,
    config: TxConfig,
}

impl<P: ResourceProvider> Clone for TransactionEngine<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: ResourceProvider> fmt::Debug for TransactionEngine<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionEngine")
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<P: ResourceProvider> TransactionEngine<P> {
    /// Create an engine. `config` is fixed for the engine's lifetime.
    pub fn new(provider: P, config: TxConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner { provider, config }),
        }
    }

    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    pub fn config(&self) -> &TxConfig {
        &self.inner.config
    }

    /// Run `f` in a read-only transaction with default options.
    pub async fn read<T, E, F, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnMut(ReadTx<P::Session>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError> + Transient + fmt::Display,
    {
        self.execute_read(CallOptions::default(), &CancellationToken::new(), f)
            .await
    }

    /// Run `f` in a read-write transaction with default options.
    pub async fn write<T, E, F, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnMut(WriteTx<P::Session>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError> + Transient + fmt::Display,
    {
        self.execute_write(CallOptions::default(), &CancellationToken::new(), f)
            .await
    }

    /// Run `f` in a read-only transaction.
    ///
    /// `f` is called once per attempt. The transaction is always rolled
    /// back, even on success.
    ///
    /// # Panics
    ///
    /// Through the installed guard, when called inside a write transaction
    /// with an isolation level of read committed or weaker.
    pub async fn execute_read<T, E, F, Fut>(
        &self,
        options: CallOptions,
        cancel: &CancellationToken,
        mut f: F,
    ) -> Result<T, E>
    where
        F: FnMut(ReadTx<P::Session>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError> + Transient + fmt::Display,
    {
        self.run(Mode::Read, options, cancel, |session, frame| {
            f(ReadTx::new(session, frame))
        })
        .await
    }

    /// Run `f` in a read-write transaction.
    ///
    /// `f` is called once per attempt; only the last attempt can commit.
    ///
    /// # Panics
    ///
    /// Through the installed guard, when called inside any other transaction.
    pub async fn execute_write<T, E, F, Fut>(
        &self,
        options: CallOptions,
        cancel: &CancellationToken,
        mut f: F,
    ) -> Result<T, E>
    where
        F: FnMut(WriteTx<P::Session>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError> + Transient + fmt::Display,
    {
        self.run(Mode::Write, options, cancel, |session, frame| {
            f(WriteTx::new(session, frame))
        })
        .await
    }

    async fn run<T, E, M, Fut>(
        &self,
        mode: Mode,
        options: CallOptions,
        cancel: &CancellationToken,
        mut make: M,
    ) -> Result<T, E>
    where
        M: FnMut(Arc<P::Session>, Arc<Frame>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError> + Transient + fmt::Display,
    {
        let config = &self.inner.config;
        let effective = options.resolve(Some(config));
        guard::assert_never_nest(&effective, mode.is_read_only(), effective.isolation);

        let started = Instant::now();
        let deadline = started
            .checked_add(effective.timeout)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let span = info_span!(
            "transaction",
            %mode,
            isolation = %effective.isolation,
            timeout_ms = effective.timeout.as_millis() as u64,
        );

        let result: Result<T, E> = async move {
            let mut retries_left = effective.retry_count;
            let mut forced_left = config.test_retries;
            let mut retried = 0u32;
            let mut attempt = 0u32;

            loop {
                attempt += 1;
                let outcome = self
                    .attempt(
                        mode,
                        effective,
                        attempt,
                        forced_left > 0,
                        cancel,
                        started,
                        deadline,
                        &mut make,
                    )
                    .await;

                match outcome {
                    Ok(value) => {
                        debug!(attempt, "transaction finished");
                        return Ok(value);
                    }
                    Err(Failure::Forced) => {
                        forced_left -= 1;
                        debug!(attempt, remaining = forced_left, "forced test retry");
                    }
                    Err(Failure::Interrupted(err)) => return Err(err.into()),
                    Err(Failure::Failed(err)) if err.is_transient() && retries_left > 0 => {
                        retries_left -= 1;
                        retried += 1;
                        warn!(
                            attempt,
                            remaining = retries_left,
                            error = %err,
                            "transient failure, retrying"
                        );
                        let delay = config.retry_backoff() * retried;
                        if let Err(err) =
                            interruptible(cancel, started, deadline, tokio::time::sleep(delay))
                                .await
                        {
                            return Err(err.into());
                        }
                    }
                    Err(Failure::Failed(err)) => {
                        if err.is_transient() {
                            warn!(attempt, error = %err, "transient failure, retries exhausted");
                        }
                        return Err(err);
                    }
                }
            }
        }
        .instrument(span)
        .await;
        result
    }

    /// One attempt: acquire, push, begin, run, commit or roll back, pop.
    #[allow(clippy::too_many_arguments)]
    async fn attempt<T, E, M, Fut>(
        &self,
        mode: Mode,
        options: EffectiveOptions,
        attempt: u32,
        force_retry: bool,
        cancel: &CancellationToken,
        started: Instant,
        deadline: Instant,
        make: &mut M,
    ) -> Result<T, Failure<E>>
    where
        M: FnMut(Arc<P::Session>, Arc<Frame>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError>,
    {
        let session = match interruptible(cancel, started, deadline, self.inner.provider.acquire())
            .await
        {
            Ok(Ok(session)) => Arc::new(session),
            Ok(Err(err)) => return Err(Failure::Failed(TransactionError::from(err).into())),
            Err(err) => return Err(Failure::Interrupted(err)),
        };

        let frame = Arc::new(Frame::new(
            session.id(),
            options,
            mode.is_read_only(),
            attempt,
        ));
        let outer = CallStack::current();
        let inner = outer.push(Arc::clone(&frame));
        debug!(attempt, session = session.id(), frame = %frame.id(), "attempt started");

        let work = inner.clone().scope(drive(
            mode,
            Arc::clone(&session),
            Arc::clone(&frame),
            force_retry,
            make,
        ));
        let outcome = match interruptible(cancel, started, deadline, work).await {
            Ok(result) => result,
            Err(err) => {
                // The attempt future was dropped mid-flight. Close the
                // transaction without a deadline, with the frame still in scope.
                inner.clone().scope(rollback_quietly(session.as_ref())).await;
                Err(Failure::Interrupted(err))
            }
        };

        let restored = inner.pop(&frame);
        debug_assert_eq!(restored.depth(), outer.depth());
        outcome
    }
}

/// Race `fut` against the caller's cancellation and the call's deadline.
async fn interruptible<F>(
    cancel: &CancellationToken,
    started: Instant,
    deadline: Instant,
    fut: F,
) -> Result<F::Output, TransactionError>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransactionError::Cancelled),
        _ = tokio::time::sleep_until(deadline) => Err(TransactionError::Timeout {
            elapsed: started.elapsed(),
        }),
        out = fut => Ok(out),
    }
}

/// Begin, run the caller's function, then close the transaction.
async fn drive<S, T, E, M, Fut>(
    mode: Mode,
    session: Arc<S>,
    frame: Arc<Frame>,
    force_retry: bool,
    make: &mut M,
) -> Result<T, Failure<E>>
where
    S: Session,
    M: FnMut(Arc<S>, Arc<Frame>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<TransactionError>,
{
    if let Err(err) = session.begin(frame.isolation()).await {
        return Err(resource_failure(err));
    }

    let result = match make(Arc::clone(&session), Arc::clone(&frame)).await {
        Ok(value) => finish(mode, session.as_ref(), force_retry).await.map(|()| value),
        Err(err) => Err(Failure::Failed(err)),
    };

    if result.is_err() {
        rollback_quietly(session.as_ref()).await;
    }
    result
}

/// Close a transaction whose work succeeded.
async fn finish<S, E>(mode: Mode, session: &S, force_retry: bool) -> Result<(), Failure<E>>
where
    S: Session,
    E: From<TransactionError>,
{
    if mode == Mode::Write {
        session
            .persist_pending_changes()
            .await
            .map_err(resource_failure)?;
    }

    if force_retry {
        return Err(Failure::Forced);
    }

    let closed = match mode {
        Mode::Write => session.commit().await,
        // Reads never commit; rolling back drops anything written by accident.
        Mode::Read => session.rollback().await,
    };
    closed.map_err(resource_failure)
}

async fn rollback_quietly<S: Session>(session: &S) {
    if let Err(err) = session.rollback().await {
        warn!(session = session.id(), error = %err, "rollback failed during cleanup");
    }
}

fn resource_failure<E>(err: crate::transaction::error::ResourceError) -> Failure<E>
where
    E: From<TransactionError>,
{
    Failure::Failed(TransactionError::from(err).into())
}
