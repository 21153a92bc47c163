//! Category-keyword content scoring.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationCategory {
    Hate,
    Violence,
    Sexual,
    SelfHarm,
    Harassment,
}

impl ModerationCategory {
    pub const ALL: [Self; 5] = [
        Self::Hate,
        Self::Violence,
        Self::Sexual,
        Self::SelfHarm,
        Self::Harassment,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hate => "hate",
            Self::Violence => "violence",
            Self::Sexual => "sexual",
            Self::SelfHarm => "self_harm",
            Self::Harassment => "harassment",
        }
    }
}

impl Display for ModerationCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value.trim())
            .ok_or_else(|| format!("unknown moderation category '{value}'"))
    }
}

/// Per-category scores in `[0, 1]`.
pub type ModerationScores = BTreeMap<ModerationCategory, f64>;

/// Pluggable content scorer. Must be a pure function of its input.
pub trait ModerationScorer: Send + Sync + Debug {
    fn score(&self, text: &str) -> ModerationScores;
}

/// Categories whose score exceeds `threshold`.
pub fn flagged(scores: &ModerationScores, threshold: f64) -> BTreeSet<ModerationCategory> {
    scores
        .iter()
        .filter(|(_, score)| **score > threshold)
        .map(|(category, _)| *category)
        .collect()
}

/// Weighted keyword density scorer.
///
/// A category scores `min(1, sum(weight * hits) / token_count)`. Terms may be
/// multi-word phrases; they match whole tokens only.
#[derive(Debug, Clone)]
pub struct KeywordModerator {
    lexicon: BTreeMap<ModerationCategory, Vec<(Vec<String>, f64)>>,
}

impl Default for KeywordModerator {
    fn default() -> Self {
        Self::from_weights(default_weights())
    }
}

impl KeywordModerator {
    pub fn from_weights(weights: BTreeMap<ModerationCategory, BTreeMap<String, f64>>) -> Self {
        let lexicon = weights
            .into_iter()
            .map(|(category, terms)| {
                let terms = terms
                    .into_iter()
                    .filter(|(_, weight)| weight.is_finite() && *weight > 0.0)
                    .map(|(term, weight)| (tokenize(&term), weight))
                    .filter(|(tokens, _)| !tokens.is_empty())
                    .collect();
                (category, terms)
            })
            .collect();
        Self { lexicon }
    }

    /// Default lexicon with `overrides` replacing whole categories.
    pub fn with_overrides(overrides: BTreeMap<ModerationCategory, BTreeMap<String, f64>>) -> Self {
        let mut weights = default_weights();
        weights.extend(overrides);
        Self::from_weights(weights)
    }
}

impl ModerationScorer for KeywordModerator {
    fn score(&self, text: &str) -> ModerationScores {
        let tokens = tokenize(text);
        let total = tokens.len().max(1) as f64;

        ModerationCategory::ALL
            .into_iter()
            .map(|category| {
                let weighted: f64 = self
                    .lexicon
                    .get(&category)
                    .map(|terms| {
                        terms
                            .iter()
                            .map(|(phrase, weight)| weight * count_phrase(&tokens, phrase) as f64)
                            .sum()
                    })
                    .unwrap_or(0.0);
                (category, (weighted / total).min(1.0))
            })
            .collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn count_phrase(tokens: &[String], phrase: &[String]) -> usize {
    if phrase.is_empty() || phrase.len() > tokens.len() {
        return 0;
    }
    tokens
        .windows(phrase.len())
        .filter(|window| *window == phrase)
        .count()
}

fn default_weights() -> BTreeMap<ModerationCategory, BTreeMap<String, f64>> {
    let table: [(ModerationCategory, &[(&str, f64)]); 5] = [
        (
            ModerationCategory::Hate,
            &[("subhuman", 1.5), ("vermin", 1.0), ("inferior race", 1.5), ("exterminate", 1.5)],
        ),
        (
            ModerationCategory::Violence,
            &[
                ("kill", 1.0),
                ("murder", 1.5),
                ("stab", 1.0),
                ("shoot", 1.0),
                ("bomb", 1.0),
                ("massacre", 1.5),
            ],
        ),
        (
            ModerationCategory::Sexual,
            &[("explicit", 0.5), ("nude", 1.0), ("porn", 1.5), ("xxx", 1.5)],
        ),
        (
            ModerationCategory::SelfHarm,
            &[("suicide", 1.5), ("self harm", 1.5), ("cut myself", 1.5), ("end my life", 1.5)],
        ),
        (
            ModerationCategory::Harassment,
            &[("idiot", 0.75), ("loser", 0.75), ("worthless", 1.0), ("shut up", 0.75)],
        ),
    ];

    table
        .into_iter()
        .map(|(category, terms)| {
            let terms = terms
                .iter()
                .map(|(term, weight)| ((*term).to_owned(), *weight))
                .collect();
            (category, terms)
        })
        .collect()
}
