//! Note entity.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::notes::error::{NoteError, NoteResult};
use crate::store::DocKey;

/// Longest accepted title, in characters.
pub const MAX_TITLE_LEN: usize = 120;

/// Identifier of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(Ulid);

impl NoteId {
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    pub(crate) fn doc_key(&self) -> DocKey {
        DocKey::from_ulid(self.0)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_string().to_lowercase())
    }
}

impl FromStr for NoteId {
    type Err = NoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(&s.to_uppercase())
            .map(NoteId)
            .map_err(|e| NoteError::Validation(format!("invalid note id '{}': {}", s, e)))
    }
}

/// Overall tone of a note body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentLabel::Positive => write!(f, "positive"),
            SentimentLabel::Neutral => write!(f, "neutral"),
            SentimentLabel::Negative => write!(f, "negative"),
        }
    }
}

/// Result of sentiment analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    /// Positive minus negative keyword hits.
    pub score: i32,
}

impl Sentiment {
    pub fn from_score(score: i32) -> Self {
        let label = match score {
            s if s > 0 => SentimentLabel::Positive,
            s if s < 0 => SentimentLabel::Negative,
            _ => SentimentLabel::Neutral,
        };
        Self { label, score }
    }
}

/// A note as stored in the `notes` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Create a new note, validating the title.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> NoteResult<Self> {
        let title = validate_title(title.into())?;
        let now = Utc::now();
        Ok(Self {
            id: NoteId::generate(),
            title,
            body: body.into(),
            sentiment: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace the title, keeping everything else.
    pub fn renamed(&self, title: impl Into<String>) -> NoteResult<Self> {
        Ok(Self {
            title: validate_title(title.into())?,
            updated_at: Utc::now(),
            ..self.clone()
        })
    }

    /// Attach an analysis result.
    pub fn with_sentiment(&self, sentiment: Sentiment) -> Self {
        Self {
            sentiment: Some(sentiment),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Case-insensitive match against title and body.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.title.to_lowercase().contains(&needle) || self.body.to_lowercase().contains(&needle)
    }
}

fn validate_title(title: String) -> NoteResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(NoteError::Validation("title must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(NoteError::Validation(format!(
            "title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(trimmed.to_string())
}
