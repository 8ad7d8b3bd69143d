//! Type-safe names for documents in the store.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a collection name or document key was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidNameError {
    #[error("name must not be empty")]
    Empty,

    #[error("name is too long ({0} characters)")]
    TooLong(usize),

    #[error("name must start with a letter or underscore, found '{0}'")]
    InvalidStart(char),

    #[error("invalid character '{char}' at position {position}")]
    InvalidCharacter { char: char, position: usize },

    #[error("name is reserved: {0}")]
    Reserved(String),
}

fn validate_chars(name: &str) -> Result<(), InvalidNameError> {
    for (i, c) in name.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
        }
    }
    Ok(())
}

/// A validated collection name.
///
/// Valid names:
/// - 1-64 characters
/// - Alphanumeric, underscores, hyphens only
/// - Must start with a letter or underscore
/// - Cannot be reserved names (_meta, _system)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Collection(String);

impl Collection {
    const RESERVED: &'static [&'static str] = &["_meta", "_system"];

    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), InvalidNameError> {
        let first = name.chars().next().ok_or(InvalidNameError::Empty)?;

        if name.len() > 64 {
            return Err(InvalidNameError::TooLong(name.len()));
        }

        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(InvalidNameError::InvalidStart(first));
        }

        validate_chars(name)?;

        if Self::RESERVED.contains(&name.to_lowercase().as_str()) {
            return Err(InvalidNameError::Reserved(name.to_string()));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated document key.
///
/// Keys are typically generated (ULIDs) but any 1-128 character name made of
/// alphanumerics, underscores and hyphens is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocKey(String);

impl DocKey {
    pub fn new(key: impl Into<String>) -> Result<Self, InvalidNameError> {
        let key = key.into();
        if key.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if key.len() > 128 {
            return Err(InvalidNameError::TooLong(key.len()));
        }
        validate_chars(&key)?;
        Ok(Self(key))
    }

    /// Generate a new ULID-based key.
    pub fn generate() -> Self {
        Self::from_ulid(ulid::Ulid::new())
    }

    /// Key for an existing ULID, in lowercase.
    pub fn from_ulid(id: ulid::Ulid) -> Self {
        Self(id.to_string().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Full address of a document: `{collection}/{key}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    pub collection: Collection,
    pub key: DocKey,
}

impl DocPath {
    pub fn new(collection: Collection, key: DocKey) -> Self {
        Self { collection, key }
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.key)
    }
}
