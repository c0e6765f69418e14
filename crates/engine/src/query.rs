use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use tally_core::{Category, Money, ParseCategoryError, Transaction};

/// Label that selects every spend category at once.
pub const ALL_EXPENSES: &str = "All Expenses";
/// Source label meaning "no source filter".
pub const ALL_SOURCES: &str = "All";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryFilter {
    AllExpenses,
    Only(Category),
}

impl CategoryFilter {
    fn matches(self, category: Category) -> bool {
        match self {
            CategoryFilter::AllExpenses => category.is_spend(),
            CategoryFilter::Only(c) => c == category,
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case(ALL_EXPENSES) {
            Ok(CategoryFilter::AllExpenses)
        } else {
            s.parse().map(CategoryFilter::Only)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    DateDesc,
    AmountDesc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "date_desc" | "date" => Ok(SortOrder::DateDesc),
            "amount_desc" | "amount" => Ok(SortOrder::AmountDesc),
            other => Err(format!("Unknown sort order: '{other}'")),
        }
    }
}

/// Date and source restriction shared by every aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// `None` or `"All"` means every source.
    pub source: Option<String>,
}

impl Scope {
    pub fn contains(&self, tx: &Transaction) -> bool {
        self.start.map_or(true, |s| tx.date >= s)
            && self.end.map_or(true, |e| tx.date <= e)
            && self
                .source
                .as_deref()
                .filter(|s| *s != ALL_SOURCES)
                .map_or(true, |s| tx.source == s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionQuery {
    pub scope: Scope,
    pub category: Option<CategoryFilter>,
    /// Case-insensitive substring of the merchant.
    pub merchant_search: Option<String>,
    /// Bounds on `amount_spend`, inclusive.
    pub min_amount: Option<Money>,
    pub max_amount: Option<Money>,
    pub exclude_transfers: bool,
    pub sort: SortOrder,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            scope: Scope::default(),
            category: None,
            merchant_search: None,
            min_amount: None,
            max_amount: None,
            exclude_transfers: true,
            sort: SortOrder::default(),
        }
    }
}

impl TransactionQuery {
    pub fn matches(&self, tx: &Transaction) -> bool {
        if self.exclude_transfers && tx.is_transfer() {
            return false;
        }
        if !self.scope.contains(tx) {
            return false;
        }
        if let Some(filter) = self.category {
            if !filter.matches(tx.category) {
                return false;
            }
        }
        if let Some(search) = self.merchant_search.as_deref().filter(|s| !s.is_empty()) {
            if !tx.merchant.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        self.min_amount.map_or(true, |min| tx.amount_spend >= min)
            && self.max_amount.map_or(true, |max| tx.amount_spend <= max)
    }

    /// Matching transactions, sorted stably so equal keys keep dataset order.
    pub fn run(&self, transactions: &[Transaction]) -> Vec<Transaction> {
        let mut rows: Vec<Transaction> = transactions
            .iter()
            .filter(|t| self.matches(t))
            .cloned()
            .collect();
        match self.sort {
            SortOrder::DateDesc => rows.sort_by(|a, b| b.date.cmp(&a.date)),
            SortOrder::AmountDesc => rows.sort_by(|a, b| b.amount_spend.cmp(&a.amount_spend)),
        }
        rows
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_income: Money,
    pub total_spend: Money,
    pub net_balance: Money,
    /// Spend-category rows.
    pub total_transactions: usize,
    pub income_transactions: usize,
}

pub fn summary(transactions: &[Transaction], scope: &Scope) -> Summary {
    let mut total_income = Money::zero();
    let mut total_spend = Money::zero();
    let mut expenses = 0;
    let mut incomes = 0;

    for tx in transactions.iter().filter(|t| scope.contains(t)) {
        match tx.category {
            Category::Exclude => {}
            Category::Income => {
                total_income += tx.amount_signed;
                incomes += 1;
            }
            _ => {
                total_spend += tx.amount_spend;
                expenses += 1;
            }
        }
    }

    Summary {
        total_income,
        total_spend,
        net_balance: total_income - total_spend,
        total_transactions: expenses,
        income_transactions: incomes,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: Category,
    pub amount: Money,
    pub count: usize,
    /// Share of total spend, one decimal place.
    pub percentage: f64,
}

pub fn category_breakdown(transactions: &[Transaction], scope: &Scope) -> Vec<CategoryShare> {
    let mut groups: BTreeMap<Category, (Money, usize)> = BTreeMap::new();
    for tx in transactions.iter().filter(|t| t.is_spend() && scope.contains(t)) {
        let entry = groups.entry(tx.category).or_default();
        entry.0 += tx.amount_spend;
        entry.1 += 1;
    }

    let total: Money = groups.values().map(|(amount, _)| *amount).sum();
    let mut shares: Vec<CategoryShare> = groups
        .into_iter()
        .map(|(category, (amount, count))| CategoryShare {
            category,
            amount,
            count,
            percentage: percentage(amount, total),
        })
        .collect();
    shares.sort_by(|a, b| b.amount.cmp(&a.amount));
    shares
}

fn percentage(part: Money, total: Money) -> f64 {
    if !total.is_positive() {
        return 0.0;
    }
    (part.as_decimal() * Decimal::ONE_HUNDRED / total.as_decimal())
        .round_dp(1)
        .to_f64()
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySpend {
    pub date: NaiveDate,
    pub amount: Money,
}

/// Spend per calendar day, ascending. Days without spend are omitted.
pub fn daily_spend(transactions: &[Transaction], scope: &Scope) -> Vec<DailySpend> {
    let mut days: BTreeMap<NaiveDate, Money> = BTreeMap::new();
    for tx in transactions
        .iter()
        .filter(|t| t.is_spend() && !t.amount_spend.is_zero() && scope.contains(t))
    {
        *days.entry(tx.date).or_default() += tx.amount_spend;
    }
    days.into_iter()
        .map(|(date, amount)| DailySpend { date, amount })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MerchantSample {
    pub date: NaiveDate,
    pub amount: Money,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MerchantSummary {
    pub name: String,
    pub current_category: Category,
    pub sample_transactions: Vec<MerchantSample>,
}

const MERCHANT_SAMPLES: usize = 3;

/// Distinct non-transfer merchants by name, each with its most recent rows.
pub fn merchants(transactions: &[Transaction], scope: &Scope) -> Vec<MerchantSummary> {
    let mut by_merchant: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for tx in transactions.iter().filter(|t| !t.is_transfer() && scope.contains(t)) {
        by_merchant.entry(tx.merchant.as_str()).or_default().push(tx);
    }

    by_merchant
        .into_iter()
        .filter_map(|(name, mut rows)| {
            rows.sort_by(|a, b| b.date.cmp(&a.date));
            let current_category = rows.first()?.category;
            Some(MerchantSummary {
                name: name.to_string(),
                current_category,
                sample_transactions: rows
                    .iter()
                    .take(MERCHANT_SAMPLES)
                    .map(|t| MerchantSample {
                        date: t.date,
                        amount: t.amount_spend,
                        description: t.description.clone(),
                    })
                    .collect(),
            })
        })
        .collect()
}
