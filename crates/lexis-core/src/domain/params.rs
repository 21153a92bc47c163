use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Write as _};

use serde::{Deserialize, Serialize};

use crate::{Operation, ValidationError};

pub const DEFAULT_SUMMARY_RATIO: f64 = 0.3;
pub const DEFAULT_TOP_N: i64 = 50;
pub const MAX_TOP_N: i64 = 500;
pub const DEFAULT_MIN_TERM_LEN: i64 = 3;
pub const MAX_MIN_TERM_LEN: i64 = 32;

/// Scalar parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Parse a command-line literal, preferring bool, then integer, then float.
    pub fn parse_literal(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<bool>() {
            return Self::Bool(value);
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return Self::Int(value);
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Self::Float(value),
            _ => Self::Text(trimmed.to_owned()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Operation parameters, kept sorted so equal maps canonicalize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into().trim().to_ascii_lowercase(), value);
    }

    /// Parse `key=value` pairs as given on a command line.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::new();
        for pair in pairs {
            let raw = pair.as_ref();
            let Some((name, value)) = raw.split_once('=') else {
                return Err(ValidationError::MalformedParameter {
                    raw: raw.to_owned(),
                });
            };
            if name.trim().is_empty() {
                return Err(ValidationError::MalformedParameter {
                    raw: raw.to_owned(),
                });
            }
            params.insert(name, ParamValue::parse_literal(value));
        }
        Ok(params)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn f64_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).and_then(ParamValue::as_f64).unwrap_or(default)
    }

    pub fn usize_or(&self, name: &str, default: usize) -> usize {
        self.get(name)
            .and_then(ParamValue::as_i64)
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(default)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Validate against `operation` and fill in defaults.
    ///
    /// The result is what providers receive and what cache keys are derived from,
    /// so an omitted parameter and its explicit default share a cache entry.
    pub fn resolve_for(&self, operation: Operation) -> Result<Self, ValidationError> {
        let accepted: &[&str] = match operation {
            Operation::Sentiment => &[],
            Operation::Summary => &["ratio"],
            Operation::Keywords => &["top_n", "min_len"],
        };

        if let Some(name) = self.0.keys().find(|name| !accepted.contains(&name.as_str())) {
            return Err(ValidationError::UnknownParameter {
                operation: operation.to_string(),
                name: name.clone(),
            });
        }

        let mut resolved = Self::new();
        match operation {
            Operation::Sentiment => {}
            Operation::Summary => {
                let ratio = self.float_param("ratio", DEFAULT_SUMMARY_RATIO)?;
                if !(ratio > 0.0 && ratio <= 1.0) {
                    return Err(invalid("ratio", "must be in (0, 1]"));
                }
                resolved.insert("ratio", ParamValue::Float(ratio));
            }
            Operation::Keywords => {
                let top_n = self.int_param("top_n", DEFAULT_TOP_N)?;
                if !(1..=MAX_TOP_N).contains(&top_n) {
                    return Err(invalid("top_n", &format!("must be in 1..={MAX_TOP_N}")));
                }
                let min_len = self.int_param("min_len", DEFAULT_MIN_TERM_LEN)?;
                if !(1..=MAX_MIN_TERM_LEN).contains(&min_len) {
                    return Err(invalid(
                        "min_len",
                        &format!("must be in 1..={MAX_MIN_TERM_LEN}"),
                    ));
                }
                resolved.insert("top_n", ParamValue::Int(top_n));
                resolved.insert("min_len", ParamValue::Int(min_len));
            }
        }
        Ok(resolved)
    }

    /// Stable `name=value;` rendering used for cache key derivation.
    pub fn canonical(&self) -> String {
        let mut output = String::new();
        for (name, value) in &self.0 {
            let _ = write!(output, "{name}={value};");
        }
        output
    }

    fn float_param(&self, name: &str, default: f64) -> Result<f64, ValidationError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_f64()
                .filter(|value| value.is_finite())
                .ok_or_else(|| invalid(name, "must be a number")),
        }
    }

    fn int_param(&self, name: &str, default: i64) -> Result<i64, ValidationError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_i64()
                .ok_or_else(|| invalid(name, "must be an integer")),
        }
    }
}

fn invalid(name: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidParameter {
        name: name.to_owned(),
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_ratio_defaults_and_bounds() {
        let resolved = Params::new()
            .resolve_for(Operation::Summary)
            .expect("defaults are valid");
        assert_eq!(resolved.f64_or("ratio", 0.0), DEFAULT_SUMMARY_RATIO);

        for bad in [0.0, -0.2, 1.5] {
            let params = Params::new().with("ratio", ParamValue::Float(bad));
            assert!(matches!(
                params.resolve_for(Operation::Summary),
                Err(ValidationError::InvalidParameter { .. })
            ));
        }

        let whole = Params::new().with("ratio", ParamValue::Int(1));
        assert!(whole.resolve_for(Operation::Summary).is_ok());
    }

    #[test]
    fn unknown_parameters_are_rejected_per_operation() {
        let params = Params::new().with("ratio", ParamValue::Float(0.5));
        assert!(matches!(
            params.resolve_for(Operation::Sentiment),
            Err(ValidationError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn explicit_defaults_canonicalize_like_omitted_ones() {
        let omitted = Params::new().resolve_for(Operation::Keywords).expect("valid");
        let explicit = Params::from_pairs(["TOP_N=50", "min_len=3"])
            .expect("parse")
            .resolve_for(Operation::Keywords)
            .expect("valid");

        assert_eq!(omitted.canonical(), explicit.canonical());
        assert_eq!(omitted.canonical(), "min_len=3;top_n=50;");
    }

    #[test]
    fn literals_parse_to_narrowest_scalar() {
        assert_eq!(ParamValue::parse_literal("true"), ParamValue::Bool(true));
        assert_eq!(ParamValue::parse_literal("12"), ParamValue::Int(12));
        assert_eq!(ParamValue::parse_literal("0.25"), ParamValue::Float(0.25));
        assert_eq!(
            ParamValue::parse_literal("fast"),
            ParamValue::Text(String::from("fast"))
        );
        assert!(matches!(
            Params::from_pairs(["ratio"]),
            Err(ValidationError::MalformedParameter { .. })
        ));
    }
}
