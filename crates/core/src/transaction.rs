use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::category::Category;
use super::money::Money;

/// Stable identifier of an imported row.
///
/// Derived from the row's content and position so re-importing the same file
/// yields the same ids and one-off overrides stay attached.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn derive(
        date: NaiveDate,
        merchant: &str,
        amount_signed: Money,
        source: &str,
        row_index: usize,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(
            format!(
                "{date}|{merchant}|{:.2}|{source}|{row_index}",
                amount_signed.as_decimal()
            )
            .as_bytes(),
        );
        let digest = hasher.finalize();
        TransactionId(digest[..8].iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        TransactionId(s.trim().to_string())
    }
}

impl From<String> for TransactionId {
    fn from(s: String) -> Self {
        TransactionId(s.trim().to_string())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A row after schema normalisation, before a category has been resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    pub id: TransactionId,
    pub date: NaiveDate,
    pub merchant: String,
    pub description: String,
    pub amount_signed: Money,
    /// Category label supplied by the bank export, if the file had one.
    pub bank_category: Option<String>,
    pub source: String,
}

/// The canonical record every aggregate and forecast operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "txn_id")]
    pub id: TransactionId,
    pub date: NaiveDate,
    pub merchant: String,
    pub description: String,
    pub amount_signed: Money,
    pub amount_spend: Money,
    pub category: Category,
    pub source: String,
}

impl Transaction {
    pub fn categorized(tx: NormalizedTransaction, category: Category) -> Self {
        Transaction {
            amount_spend: tx.amount_signed.outflow(),
            id: tx.id,
            date: tx.date,
            merchant: tx.merchant,
            description: tx.description,
            amount_signed: tx.amount_signed,
            category,
            source: tx.source,
        }
    }

    pub fn is_transfer(&self) -> bool {
        self.category.is_transfer()
    }

    pub fn is_spend(&self) -> bool {
        self.category.is_spend()
    }
}
