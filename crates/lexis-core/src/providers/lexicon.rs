use std::collections::HashMap;
use std::sync::LazyLock;

use super::text::words;
use crate::provider::{Provider, ProviderFuture};
use crate::{AnalysisPayload, Operation, Params, SentimentResult};

/// (polarity, subjectivity)
static LEXICON: LazyLock<HashMap<&'static str, (f64, f64)>> = LazyLock::new(|| {
    [
        ("good", (0.7, 0.6)),
        ("great", (0.8, 0.75)),
        ("excellent", (1.0, 1.0)),
        ("amazing", (0.6, 0.9)),
        ("wonderful", (1.0, 1.0)),
        ("best", (1.0, 0.3)),
        ("happy", (0.8, 1.0)),
        ("love", (0.5, 0.6)),
        ("like", (0.2, 0.4)),
        ("nice", (0.6, 1.0)),
        ("positive", (0.23, 0.55)),
        ("strong", (0.43, 0.73)),
        ("gain", (0.3, 0.4)),
        ("gains", (0.3, 0.4)),
        ("growth", (0.3, 0.3)),
        ("profit", (0.4, 0.3)),
        ("success", (0.6, 0.5)),
        ("successful", (0.75, 0.95)),
        ("improve", (0.4, 0.4)),
        ("improved", (0.4, 0.4)),
        ("win", (0.8, 0.4)),
        ("news", (0.05, 0.1)),
        ("bad", (-0.7, 0.67)),
        ("terrible", (-1.0, 1.0)),
        ("awful", (-1.0, 1.0)),
        ("worst", (-1.0, 1.0)),
        ("poor", (-0.4, 0.6)),
        ("sad", (-0.5, 1.0)),
        ("hate", (-0.8, 0.9)),
        ("negative", (-0.3, 0.4)),
        ("weak", (-0.38, 0.63)),
        ("loss", (-0.4, 0.4)),
        ("losses", (-0.4, 0.4)),
        ("fail", (-0.5, 0.3)),
        ("failed", (-0.5, 0.3)),
        ("failure", (-0.6, 0.4)),
        ("decline", (-0.3, 0.3)),
        ("crash", (-0.7, 0.6)),
        ("risk", (-0.2, 0.4)),
        ("problem", (-0.3, 0.4)),
        ("boring", (-1.0, 1.0)),
        ("angry", (-0.5, 1.0)),
    ]
    .into_iter()
    .collect()
});

static INTENSIFIERS: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    [
        ("very", 1.3),
        ("really", 1.2),
        ("extremely", 1.5),
        ("highly", 1.3),
        ("slightly", 0.6),
        ("somewhat", 0.7),
    ]
    .into_iter()
    .collect()
});

const NEGATIONS: &[&str] = &["not", "no", "never", "neither", "nor", "don't", "isn't", "wasn't", "aren't", "can't", "won't", "didn't"];

/// How many following tokens a negation reaches.
const NEGATION_SCOPE: usize = 3;
const NEGATION_FACTOR: f64 = -0.5;

/// Word-list sentiment scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconSentiment;

impl LexiconSentiment {
    pub const BACKEND: &'static str = "lexicon";

    /// Mean polarity and subjectivity over the words found in the lexicon.
    pub fn score(text: &str) -> SentimentResult {
        let tokens = words(text);
        let mut polarity = 0.0;
        let mut subjectivity = 0.0;
        let mut scored = 0_u32;

        for (index, token) in tokens.iter().enumerate() {
            let Some((base_polarity, base_subjectivity)) = LEXICON.get(token.as_str()) else {
                continue;
            };

            let window = &tokens[index.saturating_sub(NEGATION_SCOPE)..index];
            let mut value = *base_polarity;
            if let Some(previous) = window.last() {
                if let Some(factor) = INTENSIFIERS.get(previous.as_str()) {
                    value *= factor;
                }
            }
            if window.iter().any(|word| NEGATIONS.contains(&word.as_str())) {
                value *= NEGATION_FACTOR;
            }

            polarity += value.clamp(-1.0, 1.0);
            subjectivity += base_subjectivity;
            scored += 1;
        }

        if scored == 0 {
            return SentimentResult::from_scores(0.0, 0.0);
        }
        let count = f64::from(scored);
        SentimentResult::from_scores(polarity / count, subjectivity / count)
    }
}

impl Provider for LexiconSentiment {
    fn backend(&self) -> &str {
        Self::BACKEND
    }

    fn operation(&self) -> Operation {
        Operation::Sentiment
    }

    fn call<'a>(&'a self, text: &'a str, _params: &'a Params) -> ProviderFuture<'a> {
        Box::pin(async move { Ok(AnalysisPayload::Sentiment(Self::score(text))) })
    }
}
