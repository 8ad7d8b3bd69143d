//! Sentiment analysis of note bodies.
//!
//! Analysis stands for a slow call to an external service. It must never
//! run while a transaction is open, so callers check with
//! [`assert_never`](crate::transaction::assert_never) first.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::notes::model::Sentiment;

/// Scores a piece of text.
#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Sentiment;
}

const POSITIVE: &[&str] = &[
    "good", "great", "happy", "love", "nice", "excellent", "glad", "fun", "enjoy", "thanks",
];

const NEGATIVE: &[&str] = &[
    "bad", "sad", "angry", "hate", "awful", "terrible", "broken", "late", "annoying", "worried",
];

/// Keyword-counting analyzer with simulated network latency.
#[derive(Debug, Clone)]
pub struct KeywordSentiment {
    latency: Duration,
}

impl KeywordSentiment {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    fn score(text: &str) -> i32 {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(|word| {
                let word = word.to_lowercase();
                if POSITIVE.contains(&word.as_str()) {
                    1
                } else if NEGATIVE.contains(&word.as_str()) {
                    -1
                } else {
                    0
                }
            })
            .sum()
    }
}

impl Default for KeywordSentiment {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[async_trait]
impl SentimentAnalyzer for KeywordSentiment {
    async fn analyze(&self, text: &str) -> Sentiment {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let sentiment = Sentiment::from_score(Self::score(text));
        debug!(score = sentiment.score, label = %sentiment.label, "analyzed text");
        sentiment
    }
}
