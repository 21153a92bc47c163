//! Input screening in front of the cache and providers.
//!
//! [`SecurityGate::check`] runs, in order: emptiness checks, the per-principal
//! rate limit, deterministic prefix truncation, markup sanitization, PII
//! detection/redaction and content moderation. Everything after the rate limit
//! is a pure function of the input text, so equal inputs always produce equal
//! verdicts and equal cache keys.

mod moderation;
mod pii;
mod rate_limit;
mod sanitize;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

pub use moderation::{
    flagged, KeywordModerator, ModerationCategory, ModerationScorer, ModerationScores,
};
pub use pii::{scan as scan_pii, PiiCategory, PiiScan};
pub use rate_limit::{PrincipalRateLimiter, RateLimitConfig, RateLimitRule};
pub use sanitize::{sanitize, Sanitized};

use crate::clock::SharedClock;
use crate::{AnalysisError, Operation, ValidationError};

/// Screening policy.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityConfig {
    /// Longer input is cut to this many characters.
    pub max_input_len: usize,
    /// Replace detected PII with `[REDACTED:<CATEGORY>]`; when off, PII is only counted.
    pub redact_pii: bool,
    /// Refuse requests that contain any PII.
    pub block_on_pii: bool,
    pub moderation_threshold: f64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_input_len: 100_000,
            redact_pii: true,
            block_on_pii: false,
            moderation_threshold: 0.3,
        }
    }
}

/// Outcome of screening one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityVerdict {
    pub allowed: bool,
    pub sanitized_text: String,
    pub truncated: bool,
    pub removals: BTreeMap<&'static str, usize>,
    pub redactions: BTreeMap<PiiCategory, usize>,
    pub moderation_flags: BTreeSet<ModerationCategory>,
    pub moderation_scores: ModerationScores,
    pub reason: Option<String>,
}

impl SecurityVerdict {
    /// The caller-facing error for a refused verdict.
    pub fn rejection(&self) -> Option<AnalysisError> {
        if self.allowed {
            return None;
        }
        Some(AnalysisError::ModerationRejected {
            reason: self
                .reason
                .clone()
                .unwrap_or_else(|| String::from("moderation")),
            flags: self.moderation_flags.iter().copied().collect(),
        })
    }
}

/// Validates, sanitizes, redacts, scores and rate-limits incoming text.
#[derive(Debug)]
pub struct SecurityGate {
    config: SecurityConfig,
    limiter: PrincipalRateLimiter,
    scorer: Arc<dyn ModerationScorer>,
}

impl SecurityGate {
    pub fn new(
        config: SecurityConfig,
        rate_limits: &RateLimitConfig,
        scorer: Arc<dyn ModerationScorer>,
        clock: SharedClock,
    ) -> Self {
        Self {
            config,
            limiter: PrincipalRateLimiter::new(rate_limits, clock),
            scorer,
        }
    }

    pub fn with_defaults(clock: SharedClock) -> Self {
        Self::new(
            SecurityConfig::default(),
            &RateLimitConfig::default(),
            Arc::new(KeywordModerator::default()),
            clock,
        )
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Screen one request.
    ///
    /// # Errors
    ///
    /// `Validation` for empty text or principal, `RateLimited` when the
    /// principal's budget for `operation` is spent. A moderation or PII refusal is
    /// not an error here; it is a verdict with `allowed == false`.
    pub fn check(
        &self,
        text: &str,
        principal: &str,
        operation: Operation,
    ) -> Result<SecurityVerdict, AnalysisError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        if principal.trim().is_empty() {
            return Err(ValidationError::EmptyPrincipal.into());
        }

        self.limiter
            .check(principal, operation)
            .map_err(|retry_after| AnalysisError::RateLimited { retry_after })?;

        let (bounded, truncated) = truncate_chars(text, self.config.max_input_len);
        let verdict = self.screen(bounded, truncated);
        if verdict.sanitized_text.trim().is_empty() {
            return Err(ValidationError::EmptyAfterSanitization.into());
        }

        debug!(
            operation = operation.as_str(),
            truncated = verdict.truncated,
            removals = verdict.removals.values().sum::<usize>(),
            redactions = verdict.redactions.values().sum::<usize>(),
            allowed = verdict.allowed,
            "security screening complete"
        );
        Ok(verdict)
    }

    /// Run idle rate-limit eviction now. Returns how many principal states were dropped.
    pub fn evict_idle(&self) -> usize {
        self.limiter.evict_idle()
    }

    pub fn rate_limiter(&self) -> &PrincipalRateLimiter {
        &self.limiter
    }

    fn screen(&self, text: &str, truncated: bool) -> SecurityVerdict {
        let Sanitized { text, removals } = sanitize(text);
        let PiiScan {
            text,
            counts: redactions,
        } = scan_pii(&text, self.config.redact_pii);

        let moderation_scores = self.scorer.score(&text);
        let moderation_flags = flagged(&moderation_scores, self.config.moderation_threshold);

        let reason = if !moderation_flags.is_empty() {
            Some(String::from("moderation"))
        } else if self.config.block_on_pii && !redactions.is_empty() {
            Some(String::from("pii"))
        } else {
            None
        };

        SecurityVerdict {
            allowed: reason.is_none(),
            sanitized_text: text.trim().to_owned(),
            truncated,
            removals,
            redactions,
            moderation_flags,
            moderation_scores,
            reason,
        }
    }
}

/// Keep at most `max_chars` characters, cutting on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => (&text[..cut], true),
        None => (text, false),
    }
}
