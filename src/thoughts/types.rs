//! Thought record type definitions.
//!
//! Defines [`Sentiment`] (the three classification labels), [`SentimentScore`]
//! (a label paired with its confidence) and [`Thought`] (a full stored record).

use serde::{Deserialize, Serialize};

/// Sentiment labels a thought can be classified with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Self::Positive, Self::Neutral, Self::Negative];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "negative" => Ok(Self::Negative),
            _ => Err(format!("unknown sentiment: {s}")),
        }
    }
}

/// A sentiment label together with the confidence assigned to it.
///
/// Keeping both in one value means a record can never carry one without the other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: Sentiment,
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
}

/// A stored thought, matching the `thoughts` table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    /// Store-assigned, strictly increasing, never reused.
    pub id: i64,
    /// Text exactly as submitted.
    pub raw_text: String,
    /// Model summary, `None` when inference was unavailable.
    pub summary: Option<String>,
    pub sentiment: Option<Sentiment>,
    /// Present exactly when `sentiment` is.
    pub confidence: Option<f64>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-modification timestamp.
    pub updated_at: String,
}

impl Thought {
    pub fn score(&self) -> Option<SentimentScore> {
        match (self.sentiment, self.confidence) {
            (Some(label), Some(confidence)) => Some(SentimentScore { label, confidence }),
            _ => None,
        }
    }
}
