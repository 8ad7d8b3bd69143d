//! Nesting guards.
//!
//! One guard implementation is installed for the whole process and backs two
//! free functions any code can call:
//!
//! - [`assert_never`]: the current call chain must not be inside any
//!   transaction. Put it in front of slow external calls.
//! - [`assert_never_nest`]: checked by the engine before it touches a
//!   resource. Rejects a write inside anything, and a read at read committed
//!   (or weaker) inside a write.
//!
//! A violation under [`StrictGuard`] is a panic, not an error value. Catching
//! that panic to carry on is unsupported.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::error;

use crate::transaction::isolation::IsolationLevel;
use crate::transaction::options::EffectiveOptions;
use crate::transaction::stack::{CallStack, Frame};

static GUARD: OnceCell<Arc<dyn NestingGuard>> = OnceCell::new();

static STRICT: StrictGuard = StrictGuard;

/// A rule broken by a nested call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("transaction opened inside a transaction")]
    InsideTransaction,

    #[error("write transaction nested inside a read-only transaction")]
    WriteInsideRead,

    #[error("write transaction nested inside a write transaction")]
    WriteInsideWrite,

    #[error("{0} read nested inside a write transaction")]
    WeakReadInsideWrite(IsolationLevel),
}

/// Returned when a guard is installed twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a nesting guard is already installed")]
pub struct GuardAlreadyInstalled;

/// Policy consulted by the guard functions.
pub trait NestingGuard: Send + Sync + 'static {
    /// Called by [`assert_never`].
    fn never(&self, stack: &CallStack);

    /// Called by [`assert_never_nest`] with the options the new
    /// transaction will actually run with.
    fn never_nest(
        &self,
        stack: &CallStack,
        options: &EffectiveOptions,
        read_only: bool,
        isolation: IsolationLevel,
    );
}

/// Evaluate the nesting rules without acting on the outcome.
pub fn check_nesting(
    enclosing: Option<&Frame>,
    read_only: bool,
    isolation: IsolationLevel,
) -> Option<Violation> {
    let outer = enclosing?;
    match (outer.is_read_only(), read_only) {
        (true, false) => Some(Violation::WriteInsideRead),
        (false, false) => Some(Violation::WriteInsideWrite),
        (false, true) if isolation.is_weak() => Some(Violation::WeakReadInsideWrite(isolation)),
        _ => None,
    }
}

fn describe(stack: &CallStack) -> String {
    match stack.peek() {
        Some(top) => format!(
            "{} ({}, {}, session {}, depth {})",
            top.id(),
            if top.is_read_only() { "read" } else { "write" },
            top.isolation(),
            top.session(),
            stack.depth()
        ),
        None => "none".to_string(),
    }
}

/// Panics on every violation. Installed when nothing else is.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictGuard;

impl NestingGuard for StrictGuard {
    fn never(&self, stack: &CallStack) {
        if !stack.is_empty() {
            panic!(
                "nesting violation: {}; enclosing {}",
                Violation::InsideTransaction,
                describe(stack)
            );
        }
    }

    fn never_nest(
        &self,
        stack: &CallStack,
        _options: &EffectiveOptions,
        read_only: bool,
        isolation: IsolationLevel,
    ) {
        if let Some(violation) = check_nesting(stack.peek().as_deref(), read_only, isolation) {
            panic!(
                "nesting violation: {}; enclosing {}",
                violation,
                describe(stack)
            );
        }
    }
}

/// Reports violations through `tracing` and lets the call proceed.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingGuard;

impl NestingGuard for LoggingGuard {
    fn never(&self, stack: &CallStack) {
        if !stack.is_empty() {
            error!(
                violation = %Violation::InsideTransaction,
                enclosing = %describe(stack),
                "nesting violation"
            );
        }
    }

    fn never_nest(
        &self,
        stack: &CallStack,
        _options: &EffectiveOptions,
        read_only: bool,
        isolation: IsolationLevel,
    ) {
        if let Some(violation) = check_nesting(stack.peek().as_deref(), read_only, isolation) {
            error!(%violation, enclosing = %describe(stack), "nesting violation");
        }
    }
}

/// Install the process-wide guard. Only the first call wins.
pub fn install_guard<G>(guard: G) -> Result<(), GuardAlreadyInstalled>
where
    G: NestingGuard,
{
    GUARD
        .set(Arc::new(guard))
        .map_err(|_| GuardAlreadyInstalled)
}

/// The installed guard, or [`StrictGuard`].
pub fn guard() -> &'static dyn NestingGuard {
    match GUARD.get() {
        Some(guard) => guard.as_ref(),
        None => &STRICT,
    }
}

/// Assert the current call chain is outside every transaction.
pub fn assert_never() {
    guard().never(&CallStack::current());
}

/// Assert that opening a transaction here is allowed.
pub fn assert_never_nest(options: &EffectiveOptions, read_only: bool, isolation: IsolationLevel) {
    guard().never_nest(&CallStack::current(), options, read_only, isolation);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(read_only: bool, isolation: IsolationLevel) -> Frame {
        let options = EffectiveOptions {
            isolation,
            ..EffectiveOptions::default()
        };
        Frame::new("s", options, read_only, 1)
    }

    fn stack_with(read_only: bool) -> CallStack {
        CallStack::default().push(Arc::new(frame(read_only, IsolationLevel::ReadCommitted)))
    }

    #[test]
    fn test_nothing_to_nest_under() {
        assert_eq!(check_nesting(None, false, IsolationLevel::ReadUncommitted), None);
        assert_eq!(check_nesting(None, true, IsolationLevel::ReadCommitted), None);
    }

    #[test]
    fn test_rejected_nestings() {
        let read = frame(true, IsolationLevel::ReadCommitted);
        let write = frame(false, IsolationLevel::ReadCommitted);

        assert_eq!(
            check_nesting(Some(&read), false, IsolationLevel::Serializable),
            Some(Violation::WriteInsideRead)
        );
        assert_eq!(
            check_nesting(Some(&write), false, IsolationLevel::Serializable),
            Some(Violation::WriteInsideWrite)
        );
        assert_eq!(
            check_nesting(Some(&write), true, IsolationLevel::ReadCommitted),
            Some(Violation::WeakReadInsideWrite(IsolationLevel::ReadCommitted))
        );
        assert_eq!(
            check_nesting(Some(&write), true, IsolationLevel::ReadUncommitted),
            Some(Violation::WeakReadInsideWrite(IsolationLevel::ReadUncommitted))
        );
    }

    #[test]
    fn test_accepted_nestings() {
        let read = frame(true, IsolationLevel::Serializable);
        let write = frame(false, IsolationLevel::ReadCommitted);

        assert_eq!(check_nesting(Some(&read), true, IsolationLevel::ReadCommitted), None);
        assert_eq!(check_nesting(Some(&write), true, IsolationLevel::RepeatableRead), None);
        assert_eq!(check_nesting(Some(&write), true, IsolationLevel::Serializable), None);
    }

    #[test]
    fn test_strict_never_on_empty_stack() {
        StrictGuard.never(&CallStack::default());
    }

    #[test]
    #[should_panic(expected = "transaction opened inside a transaction")]
    fn test_strict_never_inside_read() {
        StrictGuard.never(&stack_with(true));
    }

    #[test]
    #[should_panic(expected = "write transaction nested inside a write transaction")]
    fn test_strict_write_in_write() {
        StrictGuard.never_nest(
            &stack_with(false),
            &EffectiveOptions::default(),
            false,
            IsolationLevel::Serializable,
        );
    }

    #[test]
    fn test_logging_guard_does_not_panic() {
        LoggingGuard.never(&stack_with(false));
        LoggingGuard.never_nest(
            &stack_with(true),
            &EffectiveOptions::default(),
            false,
            IsolationLevel::ReadCommitted,
        );
    }

    #[tokio::test]
    async fn test_assert_never_uses_current_stack() {
        assert_never();
        let inside = stack_with(true)
            .scope(async { std::panic::catch_unwind(assert_never).is_err() })
            .await;
        assert!(inside);
    }
}
