use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a bank export encodes outflows in a single amount column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    /// Spend is negative, income positive (the canonical form).
    NegativeIsSpend,
    /// Spend is positive, typical of credit-card exports.
    PositiveIsSpend,
}

/// Per-source choice between a fixed convention and majority-polarity inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignPolicy {
    #[default]
    NegativeIsSpend,
    PositiveIsSpend,
    Auto,
}

impl SignPolicy {
    pub fn fixed(self) -> Option<SignConvention> {
        match self {
            SignPolicy::NegativeIsSpend => Some(SignConvention::NegativeIsSpend),
            SignPolicy::PositiveIsSpend => Some(SignConvention::PositiveIsSpend),
            SignPolicy::Auto => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignPolicy::NegativeIsSpend => "negative_is_spend",
            SignPolicy::PositiveIsSpend => "positive_is_spend",
            SignPolicy::Auto => "auto",
        }
    }
}

impl fmt::Display for SignPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "negative_is_spend" | "negative" => Ok(SignPolicy::NegativeIsSpend),
            "positive_is_spend" | "positive" => Ok(SignPolicy::PositiveIsSpend),
            "auto" => Ok(SignPolicy::Auto),
            other => Err(format!("Unknown sign policy: '{other}'")),
        }
    }
}

impl Serialize for SignPolicy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SignPolicy {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A raw uploaded statement as it is persisted.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Unique stored name; doubles as the `source` tag of its transactions.
    pub name: String,
    pub content: Vec<u8>,
    /// `None` means the configured default applies.
    pub sign_policy: Option<SignPolicy>,
}
