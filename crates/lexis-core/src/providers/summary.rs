use std::collections::HashMap;

use super::text::{is_stopword, sentences, words};
use crate::domain::DEFAULT_SUMMARY_RATIO;
use crate::provider::{Provider, ProviderError, ProviderFuture};
use crate::{AnalysisPayload, Operation, Params, SummaryResult};

/// Number of sentences kept for `ratio`: at least one, at most all.
fn keep_count(total: usize, ratio: f64) -> usize {
    ((total as f64 * ratio).ceil() as usize).clamp(1, total.max(1))
}

fn build(text: &str, chosen: &[&str], ratio: f64) -> SummaryResult {
    let summary = chosen.join(" ");
    SummaryResult {
        original_len: text.chars().count(),
        summary_len: summary.chars().count(),
        summary,
        ratio,
    }
}

/// Extractive summary scoring sentences by content-word frequency.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencySummarizer;

impl FrequencySummarizer {
    pub const BACKEND: &'static str = "frequency";

    pub fn summarize(text: &str, ratio: f64) -> Result<SummaryResult, ProviderError> {
        let all = sentences(text);
        if all.is_empty() {
            return Err(ProviderError::invalid_input("text has no sentences"));
        }

        let mut frequencies: HashMap<String, f64> = HashMap::new();
        for word in words(text).into_iter().filter(|word| !is_stopword(word)) {
            *frequencies.entry(word).or_insert(0.0) += 1.0;
        }
        let peak = frequencies.values().copied().fold(1.0, f64::max);

        let mut ranked: Vec<(usize, f64)> = all
            .iter()
            .enumerate()
            .map(|(index, sentence)| {
                let content: Vec<String> = words(sentence)
                    .into_iter()
                    .filter(|word| !is_stopword(word))
                    .collect();
                let total: f64 = content
                    .iter()
                    .filter_map(|word| frequencies.get(word))
                    .map(|count| count / peak)
                    .sum();
                let score = if content.is_empty() {
                    0.0
                } else {
                    total / content.len() as f64
                };
                (index, score)
            })
            .collect();

        ranked.sort_by(|left, right| right.1.total_cmp(&left.1).then(left.0.cmp(&right.0)));
        let mut kept: Vec<usize> = ranked
            .into_iter()
            .take(keep_count(all.len(), ratio))
            .map(|(index, _)| index)
            .collect();
        kept.sort_unstable();

        let chosen: Vec<&str> = kept.into_iter().map(|index| all[index]).collect();
        Ok(build(text, &chosen, ratio))
    }
}

impl Provider for FrequencySummarizer {
    fn backend(&self) -> &str {
        Self::BACKEND
    }

    fn operation(&self) -> Operation {
        Operation::Summary
    }

    fn call<'a>(&'a self, text: &'a str, params: &'a Params) -> ProviderFuture<'a> {
        Box::pin(async move {
            let ratio = params.f64_or("ratio", DEFAULT_SUMMARY_RATIO);
            Self::summarize(text, ratio).map(AnalysisPayload::Summary)
        })
    }
}

/// Extractive summary keeping the leading sentences.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeadSummarizer;

impl LeadSummarizer {
    pub const BACKEND: &'static str = "lead";

    pub fn summarize(text: &str, ratio: f64) -> Result<SummaryResult, ProviderError> {
        let all = sentences(text);
        if all.is_empty() {
            return Err(ProviderError::invalid_input("text has no sentences"));
        }
        let keep = keep_count(all.len(), ratio);
        Ok(build(text, &all[..keep], ratio))
    }
}

impl Provider for LeadSummarizer {
    fn backend(&self) -> &str {
        Self::BACKEND
    }

    fn operation(&self) -> Operation {
        Operation::Summary
    }

    fn call<'a>(&'a self, text: &'a str, params: &'a Params) -> ProviderFuture<'a> {
        Box::pin(async move {
            let ratio = params.f64_or("ratio", DEFAULT_SUMMARY_RATIO);
            Self::summarize(text, ratio).map(AnalysisPayload::Summary)
        })
    }
}
