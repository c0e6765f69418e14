use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::category::Category;
use super::transaction::TransactionId;

/// Normalised merchant name → category, applied to every transaction from
/// that merchant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerchantRules(BTreeMap<String, Category>);

impl MerchantRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, merchant: impl Into<String>, category: Category) -> Option<Category> {
        self.0.insert(merchant.into(), category)
    }

    pub fn remove(&mut self, merchant: &str) -> Option<Category> {
        self.0.remove(merchant)
    }

    pub fn get(&self, merchant: &str) -> Option<Category> {
        self.0.get(merchant).copied()
    }

    /// Rules in merchant-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Category)> {
        self.0.iter().map(|(m, c)| (m.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Category)> for MerchantRules {
    fn from_iter<I: IntoIterator<Item = (String, Category)>>(iter: I) -> Self {
        MerchantRules(iter.into_iter().collect())
    }
}

/// Per-transaction category pins. Highest precedence of all signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OneOffOverrides(BTreeMap<TransactionId, Category>);

impl OneOffOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: TransactionId, category: Category) -> Option<Category> {
        self.0.insert(id, category)
    }

    pub fn remove(&mut self, id: &TransactionId) -> Option<Category> {
        self.0.remove(id)
    }

    pub fn get(&self, id: &TransactionId) -> Option<Category> {
        self.0.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TransactionId, Category)> {
        self.0.iter().map(|(id, c)| (id, *c))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(TransactionId, Category)> for OneOffOverrides {
    fn from_iter<I: IntoIterator<Item = (TransactionId, Category)>>(iter: I) -> Self {
        OneOffOverrides(iter.into_iter().collect())
    }
}

/// The user-editable rule state handed to every categorisation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleBook {
    pub one_off: OneOffOverrides,
    pub merchants: MerchantRules,
}
