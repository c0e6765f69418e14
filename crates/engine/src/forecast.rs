use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use tally_core::{Category, Money, Transaction, YearMonth};

pub const DEFAULT_MONTHS_LOOKBACK: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastRequest {
    pub months_lookback: usize,
    pub exclude_months: BTreeSet<YearMonth>,
    pub exclude_categories: BTreeSet<Category>,
}

impl Default for ForecastRequest {
    fn default() -> Self {
        Self {
            months_lookback: DEFAULT_MONTHS_LOOKBACK,
            exclude_months: BTreeSet::new(),
            exclude_categories: BTreeSet::new(),
        }
    }
}

/// Monthly spend statistics over a trailing window of buckets.
///
/// `std_dev` is the sample standard deviation (n − 1), zero for a single
/// month. The band is `avg ± std_dev` and is not clamped at zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastStats {
    pub avg_spend: f64,
    pub std_dev: f64,
    pub min_spend: f64,
    pub max_spend: f64,
    pub confidence_low: f64,
    pub confidence_high: f64,
    pub num_months: usize,
    /// Buckets used, oldest first.
    pub months: Vec<YearMonth>,
}

impl ForecastStats {
    pub fn empty() -> Self {
        Self {
            avg_spend: 0.0,
            std_dev: 0.0,
            min_spend: 0.0,
            max_spend: 0.0,
            confidence_low: 0.0,
            confidence_high: 0.0,
            num_months: 0,
            months: Vec::new(),
        }
    }

    fn from_buckets(buckets: &BTreeMap<YearMonth, Money>, lookback: usize) -> Self {
        let window: Vec<(YearMonth, f64)> = {
            let mut recent: Vec<_> = buckets
                .iter()
                .rev()
                .take(lookback)
                .map(|(m, total)| (*m, total.to_f64()))
                .collect();
            recent.reverse();
            recent
        };
        if window.is_empty() {
            return Self::empty();
        }

        let n = window.len() as f64;
        let totals = window.iter().map(|(_, t)| *t);
        let mean = totals.clone().sum::<f64>() / n;
        let std_dev = if window.len() > 1 {
            (totals.clone().map(|t| (t - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        let min = totals.clone().fold(f64::INFINITY, f64::min);
        let max = totals.fold(f64::NEG_INFINITY, f64::max);

        Self {
            avg_spend: round2(mean),
            std_dev: round2(std_dev),
            min_spend: round2(min),
            max_spend: round2(max),
            confidence_low: round2(mean - std_dev),
            confidence_high: round2(mean + std_dev),
            num_months: window.len(),
            months: window.into_iter().map(|(m, _)| m).collect(),
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryForecast {
    pub category: Category,
    #[serde(flatten)]
    pub stats: ForecastStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub total: ForecastStats,
    /// Highest average first.
    pub by_category: Vec<CategoryForecast>,
}

/// Projects next month's spend from the trailing qualifying months.
///
/// Only spend categories count. Each category picks its own most recent
/// `months_lookback` months, so a category absent from the latest months
/// still reports from older history.
pub fn forecast(transactions: &[Transaction], request: &ForecastRequest) -> Forecast {
    let mut total: BTreeMap<YearMonth, Money> = BTreeMap::new();
    let mut per_category: BTreeMap<Category, BTreeMap<YearMonth, Money>> = BTreeMap::new();

    let qualifying = transactions.iter().filter(|t| {
        t.is_spend()
            && !request.exclude_categories.contains(&t.category)
            && !request.exclude_months.contains(&YearMonth::of(t.date))
    });
    for tx in qualifying {
        let month = YearMonth::of(tx.date);
        *total.entry(month).or_default() += tx.amount_spend;
        *per_category
            .entry(tx.category)
            .or_default()
            .entry(month)
            .or_default() += tx.amount_spend;
    }

    let lookback = request.months_lookback;
    let mut by_category: Vec<CategoryForecast> = per_category
        .iter()
        .map(|(category, buckets)| CategoryForecast {
            category: *category,
            stats: ForecastStats::from_buckets(buckets, lookback),
        })
        .filter(|c| c.stats.num_months > 0)
        .collect();
    by_category.sort_by(|a, b| b.stats.avg_spend.total_cmp(&a.stats.avg_spend));

    Forecast {
        total: ForecastStats::from_buckets(&total, lookback),
        by_category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tally_core::{NormalizedTransaction, TransactionId};

    fn tx(d: &str, cents: i64, category: Category) -> Transaction {
        let date: NaiveDate = d.parse().unwrap();
        let amount = Money::from_cents(cents);
        Transaction::categorized(
            NormalizedTransaction {
                id: TransactionId::derive(date, "M", amount, "a.csv", 0),
                date,
                merchant: "M".into(),
                description: "M".into(),
                amount_signed: amount,
                bank_category: None,
                source: "a.csv".into(),
            },
            category,
        )
    }

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn history() -> Vec<Transaction> {
        vec![
            tx("2025-06-10", -10000, Category::Groceries),
            tx("2025-07-10", -20000, Category::Groceries),
            tx("2025-08-10", -30000, Category::Groceries),
            tx("2025-08-12", -5000, Category::Dining),
            tx("2025-09-10", -40000, Category::Groceries),
            tx("2025-09-15", 300000, Category::Income),
            tx("2025-09-20", -90000, Category::Exclude),
        ]
    }

    #[test]
    fn total_uses_trailing_window() {
        let f = forecast(&history(), &ForecastRequest::default());
        // Jul 200, Aug 350, Sep 400
        assert_eq!(f.total.num_months, 3);
        assert_eq!(f.total.months, vec![ym("2025-07"), ym("2025-08"), ym("2025-09")]);
        assert_eq!(f.total.avg_spend, 316.67);
        assert_eq!(f.total.min_spend, 200.0);
        assert_eq!(f.total.max_spend, 400.0);
        // sample stddev of 200, 350, 400
        assert_eq!(f.total.std_dev, 104.08);
        assert_eq!(f.total.confidence_low, 212.58);
        assert_eq!(f.total.confidence_high, 420.75);
    }

    #[test]
    fn excluded_months_are_skipped_not_counted() {
        let request = ForecastRequest {
            exclude_months: [ym("2025-09")].into_iter().collect(),
            ..Default::default()
        };
        let f = forecast(&history(), &request);
        assert_eq!(f.total.months, vec![ym("2025-06"), ym("2025-07"), ym("2025-08")]);
    }

    #[test]
    fn excluded_categories_are_dropped() {
        let request = ForecastRequest {
            exclude_categories: [Category::Groceries].into_iter().collect(),
            ..Default::default()
        };
        let f = forecast(&history(), &request);
        assert_eq!(f.total.num_months, 1);
        assert_eq!(f.total.avg_spend, 50.0);
        assert_eq!(f.by_category.len(), 1);
        assert_eq!(f.by_category[0].category, Category::Dining);
    }

    #[test]
    fn single_month_category_has_zero_stddev() {
        let f = forecast(&history(), &ForecastRequest::default());
        let dining = f
            .by_category
            .iter()
            .find(|c| c.category == Category::Dining)
            .unwrap();
        assert_eq!(dining.stats.num_months, 1);
        assert_eq!(dining.stats.std_dev, 0.0);
        assert_eq!(dining.stats.confidence_low, dining.stats.avg_spend);
    }

    #[test]
    fn categories_ordered_by_average() {
        let f = forecast(&history(), &ForecastRequest::default());
        let cats: Vec<Category> = f.by_category.iter().map(|c| c.category).collect();
        assert_eq!(cats, vec![Category::Groceries, Category::Dining]);
    }

    #[test]
    fn category_windows_are_independent() {
        let mut rows = history();
        rows.push(tx("2025-01-05", -1000, Category::Travel));
        let f = forecast(&rows, &ForecastRequest::default());
        let travel = f
            .by_category
            .iter()
            .find(|c| c.category == Category::Travel)
            .unwrap();
        assert_eq!(travel.stats.months, vec![ym("2025-01")]);
    }

    #[test]
    fn band_is_not_clamped() {
        let rows = vec![
            tx("2025-01-05", -100, Category::Fees),
            tx("2025-02-05", -10000, Category::Fees),
        ];
        let f = forecast(&rows, &ForecastRequest::default());
        assert!(f.total.confidence_low < 0.0);
    }

    #[test]
    fn empty_history_is_zeroed() {
        let f = forecast(&[], &ForecastRequest::default());
        assert_eq!(f.total, ForecastStats::empty());
        assert!(f.by_category.is_empty());
    }

    #[test]
    fn zero_lookback_is_zeroed() {
        let request = ForecastRequest {
            months_lookback: 0,
            ..Default::default()
        };
        let f = forecast(&history(), &request);
        assert_eq!(f.total.num_months, 0);
        assert!(f.by_category.is_empty());
    }
}
