//! Regex-based personal data detection and redaction.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    Email,
    CreditCard,
    Ssn,
    Ipv4,
    Phone,
}

impl PiiCategory {
    /// Detection order. Card numbers run before phones so a card is never split
    /// into phone-shaped pieces.
    pub const ALL: [Self; 5] = [
        Self::Email,
        Self::CreditCard,
        Self::Ssn,
        Self::Ipv4,
        Self::Phone,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::CreditCard => "CREDIT_CARD",
            Self::Ssn => "SSN",
            Self::Ipv4 => "IPV4",
            Self::Phone => "PHONE",
        }
    }

    /// Replacement token, e.g. `[REDACTED:EMAIL]`.
    pub fn token(self) -> String {
        format!("[REDACTED:{}]", self.label())
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Self::Email => &EMAIL,
            Self::CreditCard => &CREDIT_CARD,
            Self::Ssn => &SSN,
            Self::Ipv4 => &IPV4,
            Self::Phone => &PHONE,
        }
    }
}

impl Display for PiiCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").expect("invalid email regex")
});

static CREDIT_CARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{4}[ -]?){3}\d{1,4}\b").expect("invalid card regex")
});

static SSN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("invalid ssn regex"));

static IPV4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b",
    )
    .expect("invalid ipv4 regex")
});

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[ .-]?)?(?:\(\d{3}\)|\b\d{3})[ .-]?\d{3}[ .-]\d{4}\b")
        .expect("invalid phone regex")
});

/// Result of a PII pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiiScan {
    pub text: String,
    pub counts: BTreeMap<PiiCategory, usize>,
}

/// Count PII matches and, when `redact` is set, replace each with its token.
///
/// Detection always runs against the progressively redacted text, so report-only
/// and redacting modes count the same matches.
pub fn scan(input: &str, redact: bool) -> PiiScan {
    let mut working = input.to_owned();
    let mut counts = BTreeMap::new();

    for category in PiiCategory::ALL {
        let pattern = category.pattern();
        let hits = pattern.find_iter(&working).count();
        if hits == 0 {
            continue;
        }
        counts.insert(category, hits);
        working = pattern
            .replace_all(&working, category.token().as_str())
            .into_owned();
    }

    PiiScan {
        text: if redact { working } else { input.to_owned() },
        counts,
    }
}
