use std::collections::HashMap;

use super::text::{is_stopword, words};
use crate::domain::{DEFAULT_MIN_TERM_LEN, DEFAULT_TOP_N};
use crate::provider::{Provider, ProviderFuture};
use crate::{AnalysisPayload, KeywordResult, KeywordTerm, Operation, Params};

/// Stop-word filtered term counts, the data behind a word cloud.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencyKeywords;

impl FrequencyKeywords {
    pub const BACKEND: &'static str = "frequency";

    /// Terms ordered by count descending, then alphabetically.
    pub fn extract(text: &str, top_n: usize, min_len: usize) -> KeywordResult {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for word in words(text) {
            if word.chars().count() < min_len
                || is_stopword(&word)
                || word.chars().all(|c| c.is_numeric())
            {
                continue;
            }
            *counts.entry(word).or_insert(0) += 1;
        }

        let mut terms: Vec<KeywordTerm> = counts
            .into_iter()
            .map(|(term, count)| KeywordTerm { term, count })
            .collect();
        terms.sort_by(|left, right| {
            right
                .count
                .cmp(&left.count)
                .then_with(|| left.term.cmp(&right.term))
        });
        terms.truncate(top_n);
        KeywordResult { terms }
    }
}

impl Provider for FrequencyKeywords {
    fn backend(&self) -> &str {
        Self::BACKEND
    }

    fn operation(&self) -> Operation {
        Operation::Keywords
    }

    fn call<'a>(&'a self, text: &'a str, params: &'a Params) -> ProviderFuture<'a> {
        Box::pin(async move {
            let top_n = params.usize_or("top_n", DEFAULT_TOP_N as usize);
            let min_len = params.usize_or("min_len", DEFAULT_MIN_TERM_LEN as usize);
            Ok(AnalysisPayload::Keywords(Self::extract(text, top_n, min_len)))
        })
    }
}
