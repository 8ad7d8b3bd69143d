//! Transaction isolation levels.
//!
//! Levels are totally ordered from weakest to strongest, which is what the
//! nesting guard relies on when it compares a nested read against the
//! enclosing write:
//! - ReadUncommitted < ReadCommitted < RepeatableRead < Serializable

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transaction isolation level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum IsolationLevel {
    /// Reads may observe uncommitted data of other transactions.
    ReadUncommitted,

    /// Each read sees the most recently committed data at the time of the read.
    ///
    /// Different reads within the same transaction might see different data
    /// if another transaction commits in between.
    #[default]
    ReadCommitted,

    /// All reads see a consistent snapshot taken when the transaction began.
    RepeatableRead,

    /// Snapshot reads plus validation of everything read at commit time.
    Serializable,
}

impl IsolationLevel {
    /// The weakest level that still only observes committed data.
    pub const WEAKEST_COMMITTED: IsolationLevel = IsolationLevel::ReadCommitted;

    /// Check if this isolation level uses snapshot reads.
    pub fn uses_snapshot(&self) -> bool {
        *self >= IsolationLevel::RepeatableRead
    }

    /// True for read committed and anything weaker.
    pub fn is_weak(&self) -> bool {
        *self <= Self::WEAKEST_COMMITTED
    }

    /// Get a human-readable description of this isolation level.
    pub fn description(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "Reads may see uncommitted changes",
            IsolationLevel::ReadCommitted => "Each read sees the latest committed data",
            IsolationLevel::RepeatableRead => {
                "All reads see a consistent snapshot from transaction start"
            }
            IsolationLevel::Serializable => {
                "Snapshot reads, validated against concurrent commits"
            }
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::ReadUncommitted => write!(f, "READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => write!(f, "READ COMMITTED"),
            IsolationLevel::RepeatableRead => write!(f, "REPEATABLE READ"),
            IsolationLevel::Serializable => write!(f, "SERIALIZABLE"),
        }
    }
}

/// Parse isolation level from string (SQL syntax, snake case or compact).
impl std::str::FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "READ UNCOMMITTED" | "READUNCOMMITTED" => Ok(IsolationLevel::ReadUncommitted),
            "READ COMMITTED" | "READCOMMITTED" => Ok(IsolationLevel::ReadCommitted),
            "REPEATABLE READ" | "REPEATABLEREAD" | "SNAPSHOT" => {
                Ok(IsolationLevel::RepeatableRead)
            }
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            _ => Err(format!("unknown isolation level: {}", s)),
        }
    }
}

impl TryFrom<String> for IsolationLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IsolationLevel> for String {
    fn from(level: IsolationLevel) -> Self {
        level.to_string().to_lowercase()
    }
}
