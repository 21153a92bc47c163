//! Behavior-driven tests for input screening.
//!
//! The gate sits in front of the cache, so these tests focus on the properties
//! the cache relies on: verdicts are deterministic, screening an already
//! screened text changes nothing, and budgets are tracked per principal.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use lexis_core::security::{
    sanitize, KeywordModerator, ModerationCategory, PiiCategory, RateLimitConfig, RateLimitRule,
};
use lexis_core::{
    AnalysisError, ManualClock, Operation, SecurityConfig, SecurityGate, SharedClock,
    ValidationError,
};

fn gate_with(config: SecurityConfig, rules: &[(Operation, u32)]) -> (SecurityGate, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let rate_limits = RateLimitConfig {
        rules: rules
            .iter()
            .map(|(operation, limit)| (*operation, RateLimitRule::per_minute(*limit)))
            .collect(),
        idle_eviction_interval: Duration::from_secs(300),
    };
    let gate = SecurityGate::new(
        config,
        &rate_limits,
        Arc::new(KeywordModerator::default()),
        SharedClock::new(clock.clone()),
    );
    (gate, clock)
}

fn open_gate() -> SecurityGate {
    gate_with(SecurityConfig::default(), &[]).0
}

// =============================================================================
// Sanitization and redaction
// =============================================================================

#[test]
fn screening_is_idempotent() {
    // Given: Text with markup, template syntax and PII
    let gate = open_gate();
    let raw = "Hello <script>alert(1)</script> team, {{ user.secret }} mail bob@example.com \
               or call 555-123-4567 <a href=\"x\" onclick=\"steal()\">here</a>";

    // When: The text is screened, then the output is screened again
    let first = gate.check(raw, "u1", Operation::Sentiment).expect("first pass");
    let second = gate
        .check(&first.sanitized_text, "u1", Operation::Sentiment)
        .expect("second pass");

    // Then: The first pass did the work and the second is a no-op
    assert!(!first.removals.is_empty());
    assert_eq!(first.redactions.get(&PiiCategory::Email), Some(&1));
    assert_eq!(first.redactions.get(&PiiCategory::Phone), Some(&1));
    assert!(!first.sanitized_text.contains("<script"));
    assert!(!first.sanitized_text.contains("onclick"));
    assert!(!first.sanitized_text.contains("bob@example.com"));

    assert!(second.removals.is_empty());
    assert!(second.redactions.is_empty());
    assert_eq!(second.sanitized_text, first.sanitized_text);
}

#[test]
fn reassembled_fragments_are_removed_until_nothing_matches() {
    // Given: A scheme that reappears after one removal
    let input = "click javajavascript:script:alert(1) now";

    // When: It is sanitized
    let sanitized = sanitize(input);

    // Then: Both layers are gone and a second pass changes nothing
    assert_eq!(sanitized.text, "click alert(1) now");
    assert_eq!(sanitized.removals.get("javascript_url"), Some(&2));
    assert_eq!(sanitize(&sanitized.text).text, sanitized.text);
}

#[test]
fn identical_input_yields_identical_verdicts() {
    // Given: Two gates with the same policy
    let left = open_gate();
    let right = open_gate();
    let text = "Call me at (555) 987-6543 about the <b>launch</b>";

    // When: Both screen the same text
    let a = left.check(text, "u1", Operation::Keywords).expect("verdict");
    let b = right.check(text, "u2", Operation::Keywords).expect("verdict");

    // Then: The verdicts are equal
    assert_eq!(a, b);
}

#[test]
fn long_input_is_truncated_before_screening() {
    // Given: A gate that keeps ten characters
    let (gate, _) = gate_with(
        SecurityConfig {
            max_input_len: 10,
            ..SecurityConfig::default()
        },
        &[],
    );

    // When: Longer text arrives
    let verdict = gate
        .check("abcdefghijKLMNOP", "u1", Operation::Summary)
        .expect("verdict");

    // Then: The prefix survives and truncation is reported
    assert!(verdict.truncated);
    assert_eq!(verdict.sanitized_text, "abcdefghij");
}

#[test]
fn report_only_mode_counts_pii_without_rewriting() {
    // Given: Redaction disabled
    let (gate, _) = gate_with(
        SecurityConfig {
            redact_pii: false,
            ..SecurityConfig::default()
        },
        &[],
    );

    // When: Text with an address and an IP is screened
    let verdict = gate
        .check("ping 10.0.0.1 or ann@example.org", "u1", Operation::Sentiment)
        .expect("verdict");

    // Then: The text is untouched but both categories are counted
    assert_eq!(verdict.sanitized_text, "ping 10.0.0.1 or ann@example.org");
    assert_eq!(verdict.redactions.get(&PiiCategory::Ipv4), Some(&1));
    assert_eq!(verdict.redactions.get(&PiiCategory::Email), Some(&1));
    assert!(verdict.allowed);
}

// =============================================================================
// Moderation
// =============================================================================

#[test]
fn harmful_text_is_refused_with_its_categories() {
    // Given: The default moderator
    let gate = open_gate();

    // When: Violent text is screened
    let verdict = gate
        .check("kill them, murder them all", "u1", Operation::Sentiment)
        .expect("verdict");

    // Then: The verdict refuses it and maps to 422
    assert!(!verdict.allowed);
    assert!(verdict.moderation_flags.contains(&ModerationCategory::Violence));
    assert!(verdict.moderation_scores[&ModerationCategory::Violence] > 0.3);
    let rejection = verdict.rejection().expect("refused");
    assert_eq!(rejection.http_status(), 422);
}

#[test]
fn overridden_category_replaces_the_default_lexicon() {
    // Given: Harassment terms replaced by a single custom term
    let moderator = KeywordModerator::with_overrides(BTreeMap::from([(
        ModerationCategory::Harassment,
        BTreeMap::from([(String::from("rubbish"), 1.0)]),
    )]));
    let gate = SecurityGate::new(
        SecurityConfig::default(),
        &RateLimitConfig::default(),
        Arc::new(moderator),
        SharedClock::new(Arc::new(ManualClock::new())),
    );

    // When: Old and new terms are screened
    let custom = gate.check("utter rubbish", "u1", Operation::Sentiment).expect("verdict");
    let former = gate.check("you idiot", "u1", Operation::Sentiment).expect("verdict");

    // Then: Only the configured term is flagged
    assert!(custom.moderation_flags.contains(&ModerationCategory::Harassment));
    assert!(former.allowed);
}

#[test]
fn benign_text_passes_with_zero_scores() {
    let verdict = open_gate()
        .check("The quarterly report looks promising", "u1", Operation::Summary)
        .expect("verdict");

    assert!(verdict.allowed);
    assert!(verdict.moderation_flags.is_empty());
    assert!(verdict.moderation_scores.values().all(|score| *score == 0.0));
}

// =============================================================================
// Rate limiting
// =============================================================================

#[test]
fn budget_is_per_principal_and_per_operation() {
    // Given: One summary per minute
    let (gate, _) = gate_with(SecurityConfig::default(), &[(Operation::Summary, 1)]);

    // When: u1 spends its summary budget
    gate.check("first", "u1", Operation::Summary).expect("allowed");
    let limited = gate.check("second", "u1", Operation::Summary);

    // Then: u1 is limited while u2 and other operations are not
    assert!(matches!(limited, Err(AnalysisError::RateLimited { .. })));
    assert!(gate.check("second", "u2", Operation::Summary).is_ok());
    assert!(gate.check("second", "u1", Operation::Sentiment).is_ok());
}

#[test]
fn budget_replenishes_as_the_window_slides() {
    // Given: Three sentiment requests per minute, all spent
    let (gate, clock) = gate_with(SecurityConfig::default(), &[(Operation::Sentiment, 3)]);
    for _ in 0..3 {
        gate.check("text", "u1", Operation::Sentiment).expect("allowed");
    }

    // When: A fourth arrives immediately
    let Err(AnalysisError::RateLimited { retry_after }) =
        gate.check("text", "u1", Operation::Sentiment)
    else {
        panic!("expected rate limit");
    };

    // Then: The hint is at most one replenish interval and waiting that long is enough
    assert!(retry_after > Duration::ZERO);
    assert!(retry_after <= Duration::from_secs(20));
    clock.advance(retry_after);
    assert!(gate.check("text", "u1", Operation::Sentiment).is_ok());
}

#[test]
fn idle_principals_are_evicted() {
    // Given: Two principals with live limiter state
    let (gate, clock) = gate_with(SecurityConfig::default(), &[(Operation::Sentiment, 5)]);
    gate.check("a", "u1", Operation::Sentiment).expect("allowed");
    gate.check("b", "u2", Operation::Sentiment).expect("allowed");
    assert_eq!(gate.rate_limiter().tracked(Operation::Sentiment), 2);

    // When: Their budgets fully replenish and eviction runs
    clock.advance(Duration::from_secs(120));
    let evicted = gate.evict_idle();

    // Then: No state is kept for them
    assert_eq!(evicted, 2);
    assert_eq!(gate.rate_limiter().tracked(Operation::Sentiment), 0);
}

#[test]
fn rejected_input_does_not_reach_the_limiter() {
    // Given: One request per minute
    let (gate, _) = gate_with(SecurityConfig::default(), &[(Operation::Keywords, 1)]);

    // When: An empty request is refused
    let empty = gate.check("  ", "u1", Operation::Keywords);

    // Then: The budget is still available
    assert_eq!(
        empty,
        Err(AnalysisError::Validation(ValidationError::EmptyText))
    );
    assert!(gate.check("real text", "u1", Operation::Keywords).is_ok());
}
