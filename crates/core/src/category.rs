use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown category: '{0}'")]
pub struct ParseCategoryError(pub String);

/// The closed set of labels a transaction can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Groceries,
    Dining,
    Entertainment,
    Shopping,
    Transportation,
    Travel,
    Utilities,
    Housing,
    Health,
    Subscriptions,
    Education,
    Fees,
    Other,
    Income,
    /// Transfers and anything else kept out of spend and income totals.
    #[serde(rename = "EXCLUDE")]
    Exclude,
}

pub const ALL_CATEGORIES: &[Category] = &[
    Category::Groceries,
    Category::Dining,
    Category::Entertainment,
    Category::Shopping,
    Category::Transportation,
    Category::Travel,
    Category::Utilities,
    Category::Housing,
    Category::Health,
    Category::Subscriptions,
    Category::Education,
    Category::Fees,
    Category::Other,
    Category::Income,
    Category::Exclude,
];

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::Groceries => "Groceries",
            Category::Dining => "Dining",
            Category::Entertainment => "Entertainment",
            Category::Shopping => "Shopping",
            Category::Transportation => "Transportation",
            Category::Travel => "Travel",
            Category::Utilities => "Utilities",
            Category::Housing => "Housing",
            Category::Health => "Health",
            Category::Subscriptions => "Subscriptions",
            Category::Education => "Education",
            Category::Fees => "Fees",
            Category::Other => "Other",
            Category::Income => "Income",
            Category::Exclude => "EXCLUDE",
        }
    }

    /// True for every category that counts toward spend totals.
    pub fn is_spend(self) -> bool {
        !matches!(self, Category::Income | Category::Exclude)
    }

    pub fn is_transfer(self) -> bool {
        self == Category::Exclude
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ALL_CATEGORIES
            .iter()
            .copied()
            .find(|c| c.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseCategoryError(wanted.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_from_str() {
        for c in ALL_CATEGORIES {
            assert_eq!(c.label().parse::<Category>().unwrap(), *c);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("groceries".parse::<Category>().unwrap(), Category::Groceries);
        assert_eq!(" exclude ".parse::<Category>().unwrap(), Category::Exclude);
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert_eq!(
            "Crypto".parse::<Category>(),
            Err(ParseCategoryError("Crypto".to_string()))
        );
    }

    #[test]
    fn income_and_exclude_are_not_spend() {
        assert!(!Category::Income.is_spend());
        assert!(!Category::Exclude.is_spend());
        assert!(Category::Other.is_spend());
    }

    #[test]
    fn exclude_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Category::Exclude).unwrap(), "\"EXCLUDE\"");
        assert_eq!(serde_json::to_string(&Category::Dining).unwrap(), "\"Dining\"");
    }
}
