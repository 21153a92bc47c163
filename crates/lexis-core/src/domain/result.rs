use serde::{Deserialize, Serialize};

use crate::Operation;

/// Polarity in [-1, 1], subjectivity in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub polarity: f64,
    pub subjectivity: f64,
    pub label: SentimentLabel,
}

impl SentimentResult {
    /// Build a result with clamped scores and the label implied by `polarity`.
    pub fn from_scores(polarity: f64, subjectivity: f64) -> Self {
        let polarity = polarity.clamp(-1.0, 1.0);
        Self {
            polarity,
            subjectivity: subjectivity.clamp(0.0, 1.0),
            label: SentimentLabel::from_polarity(polarity),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub const NEUTRAL_BAND: f64 = 0.05;

    pub fn from_polarity(polarity: f64) -> Self {
        if polarity > Self::NEUTRAL_BAND {
            Self::Positive
        } else if polarity < -Self::NEUTRAL_BAND {
            Self::Negative
        } else {
            Self::Neutral
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
    pub original_len: usize,
    pub summary_len: usize,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTerm {
    pub term: String,
    pub count: u32,
}

/// Terms ordered by descending count, ties broken alphabetically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordResult {
    pub terms: Vec<KeywordTerm>,
}

/// Operation-specific payload produced by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisPayload {
    Sentiment(SentimentResult),
    Summary(SummaryResult),
    Keywords(KeywordResult),
}

impl AnalysisPayload {
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Sentiment(_) => Operation::Sentiment,
            Self::Summary(_) => Operation::Summary,
            Self::Keywords(_) => Operation::Keywords,
        }
    }
}

/// Payload plus serving metadata. Immutable once cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub payload: AnalysisPayload,
    pub from_cache: bool,
    pub backend: String,
    pub elapsed_ms: u64,
}

impl AnalysisResult {
    pub fn operation(&self) -> Operation {
        self.payload.operation()
    }
}
