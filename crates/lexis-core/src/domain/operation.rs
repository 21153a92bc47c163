use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Analysis operation offered by providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Sentiment,
    Summary,
    Keywords,
}

impl Operation {
    pub const ALL: [Self; 3] = [Self::Sentiment, Self::Summary, Self::Keywords];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sentiment => "sentiment",
            Self::Summary => "summary",
            Self::Keywords => "keywords",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sentiment" => Ok(Self::Sentiment),
            "summary" | "summarize" => Ok(Self::Summary),
            "keywords" | "wordcloud" | "word_cloud" => Ok(Self::Keywords),
            other => Err(ValidationError::UnknownOperation {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_case_insensitively() {
        assert_eq!("Summary".parse::<Operation>(), Ok(Operation::Summary));
        assert_eq!("wordcloud".parse::<Operation>(), Ok(Operation::Keywords));
        assert!(matches!(
            "translate".parse::<Operation>(),
            Err(ValidationError::UnknownOperation { .. })
        ));
    }
}
