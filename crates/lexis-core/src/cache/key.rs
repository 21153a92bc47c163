use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Operation, Params};

/// Content-addressed cache key: `<operation>:<sha256-hex>`.
///
/// The digest covers the operation, the normalized sanitized text and the
/// canonical parameters. The operation prefix allows invalidating a whole
/// operation; the raw text cannot be recovered from the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(operation: Operation, sanitized_text: &str, params: &Params) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(operation.as_str().as_bytes());
        hasher.update([0x1f]);
        hasher.update(normalize(sanitized_text).as_bytes());
        hasher.update([0x1f]);
        hasher.update(params.canonical().as_bytes());
        Self(format!("{}{}", Self::prefix(operation), hex::encode(hasher.finalize())))
    }

    /// Parse a previously rendered key, rejecting anything not shaped like one.
    pub fn parse(raw: &str) -> Option<Self> {
        let (operation, digest) = raw.split_once(':')?;
        operation.parse::<Operation>().ok()?;
        let well_formed = digest.len() == 64
            && digest
                .bytes()
                .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte));
        well_formed.then(|| Self(raw.to_owned()))
    }

    /// Key prefix shared by every entry of `operation`.
    pub fn prefix(operation: Operation) -> String {
        format!("{}:", operation.as_str())
    }

    pub fn operation(&self) -> Option<Operation> {
        self.0.split_once(':')?.0.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase and collapse whitespace runs to single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParamValue;

    #[test]
    fn equivalent_text_shares_a_key() {
        let params = Params::new();
        let a = CacheKey::derive(Operation::Sentiment, "Great  news\ttoday", &params);
        let b = CacheKey::derive(Operation::Sentiment, "great news today ", &params);
        assert_eq!(a, b);
    }

    #[test]
    fn operation_and_params_separate_keys() {
        let text = "the same text";
        let base = CacheKey::derive(Operation::Summary, text, &Params::new());
        let tuned = CacheKey::derive(
            Operation::Summary,
            text,
            &Params::new().with("ratio", ParamValue::Float(0.5)),
        );
        let other_op = CacheKey::derive(Operation::Keywords, text, &Params::new());

        assert_ne!(base, tuned);
        assert_ne!(base, other_op);
        assert!(base.as_str().starts_with("summary:"));
        assert_eq!(other_op.operation(), Some(Operation::Keywords));
    }

    #[test]
    fn key_does_not_contain_the_text() {
        let key = CacheKey::derive(Operation::Sentiment, "secret launch plans", &Params::new());

        assert!(!key.as_str().contains("secret"));
        assert_eq!(CacheKey::parse(key.as_str()), Some(key.clone()));
        assert_eq!(CacheKey::parse("sentiment:not-a-digest"), None);
        assert_eq!(CacheKey::parse("../../etc/passwd"), None);
    }
}
