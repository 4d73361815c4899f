#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Programming language of a submission.
///
/// The literals are part of the wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Language {
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "CPP"))]
    Cpp,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "JAVA"))]
    Java,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "PYTHON"))]
    Python,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "JAVASCRIPT"))]
    Javascript,
}

impl Language {
    pub const ALL: &'static [Language] = &[Self::Cpp, Self::Java, Self::Python, Self::Javascript];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpp => "CPP",
            Self::Java => "JAVA",
            Self::Python => "PYTHON",
            Self::Javascript => "JAVASCRIPT",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an unsupported language string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported language '{0}'")]
pub struct ParseLanguageError(String);

impl FromStr for Language {
    type Err = ParseLanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .iter()
            .find(|lang| lang.as_str() == s)
            .copied()
            .ok_or_else(|| ParseLanguageError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_literals() {
        assert_eq!(serde_json::to_string(&Language::Cpp).unwrap(), "\"CPP\"");
        assert_eq!(
            serde_json::to_string(&Language::Javascript).unwrap(),
            "\"JAVASCRIPT\""
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!("PYTHON".parse::<Language>().unwrap(), Language::Python);
        assert!("RUST".parse::<Language>().is_err());
    }
}
