//! Per-call transaction options.
//!
//! Every field is optional. Resolution order is: the call's own value, then
//! the process configuration, then the hard defaults below.

use std::time::Duration;

use crate::config::TxConfig;
use crate::transaction::isolation::IsolationLevel;

/// Timeout used when neither the call nor the configuration sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry budget used when neither the call nor the configuration sets one.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Isolation level used when neither the call nor the configuration sets one.
pub const DEFAULT_ISOLATION: IsolationLevel = IsolationLevel::ReadCommitted;

/// Overrides for a single transactional call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub retry_count: Option<u32>,
    pub isolation: Option<IsolationLevel>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout for the whole call, retries included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set how many times a transient failure may be retried.
    pub fn retry_count(mut self, retries: u32) -> Self {
        self.retry_count = Some(retries);
        self
    }

    /// Set the isolation level.
    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = Some(isolation);
        self
    }

    /// Resolve against the process configuration.
    pub fn resolve(&self, config: Option<&TxConfig>) -> EffectiveOptions {
        EffectiveOptions {
            timeout: self
                .timeout
                .or_else(|| config.and_then(|c| c.default_timeout))
                .unwrap_or(DEFAULT_TIMEOUT),
            retry_count: self
                .retry_count
                .or_else(|| config.and_then(|c| c.retry_count))
                .unwrap_or(DEFAULT_RETRY_COUNT),
            isolation: self
                .isolation
                .or_else(|| config.and_then(|c| c.default_isolation_level))
                .unwrap_or(DEFAULT_ISOLATION),
        }
    }
}

/// Fully resolved options, fixed for every attempt of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveOptions {
    pub timeout: Duration,
    pub retry_count: u32,
    pub isolation: IsolationLevel,
}

impl Default for EffectiveOptions {
    fn default() -> Self {
        CallOptions::default().resolve(None)
    }
}
