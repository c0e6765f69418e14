use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::io::Read;
use std::str::FromStr;
use tally_core::{Money, NormalizedTransaction, SignConvention, SignPolicy, TransactionId};
use thiserror::Error;

use crate::merchant::normalize_merchant;

// ── Header aliases ────────────────────────────────────────────────────────────

const DATE_ALIASES: &[&str] = &[
    "transaction date",
    "date",
    "posted date",
    "posting date",
    "trans. date",
    "trans date",
    "booking date",
    "value date",
];
const DESCRIPTION_ALIASES: &[&str] = &[
    "description",
    "merchant",
    "payee",
    "name",
    "merchant name",
    "details",
    "narrative",
    "memo",
];
const AMOUNT_ALIASES: &[&str] = &["amount", "transaction amount", "amount (usd)", "value"];
const CATEGORY_ALIASES: &[&str] = &["category", "transaction category", "bank category"];
const DEBIT_ALIASES: &[&str] = &["debit", "withdrawal", "withdrawals", "money out", "paid out"];
const CREDIT_ALIASES: &[&str] = &["credit", "deposit", "deposits", "money in", "paid in"];

// Order matters: two-digit years must be tried before `%Y`, which would
// otherwise read "25" as year 25.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d %b %Y", "%b %d, %Y",
];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("File has no header row")]
    MissingHeader,
    #[error("Missing required column '{field}' (looked for: {tried})")]
    MissingColumn { field: &'static str, tried: String },
}

impl SchemaError {
    fn missing(field: &'static str, aliases: &[&str]) -> Self {
        SchemaError::MissingColumn {
            field,
            tried: aliases.join(", "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountColumns {
    Signed(usize),
    DebitCredit { debit: usize, credit: usize },
}

/// Column positions resolved from a header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub date: usize,
    pub description: usize,
    pub amount: AmountColumns,
    pub category: Option<usize>,
}

impl ColumnMapping {
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Result<Self, SchemaError> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h.as_ref())).collect();
        if normalized.iter().all(|h| h.is_empty()) {
            return Err(SchemaError::MissingHeader);
        }
        let find = |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| normalized.iter().position(|h| h == alias))
        };

        let date = find(DATE_ALIASES).ok_or_else(|| SchemaError::missing("date", DATE_ALIASES))?;
        let description = find(DESCRIPTION_ALIASES)
            .ok_or_else(|| SchemaError::missing("description", DESCRIPTION_ALIASES))?;
        let amount = match (find(AMOUNT_ALIASES), find(DEBIT_ALIASES), find(CREDIT_ALIASES)) {
            (Some(col), _, _) => AmountColumns::Signed(col),
            (None, Some(debit), Some(credit)) => AmountColumns::DebitCredit { debit, credit },
            _ => return Err(SchemaError::missing("amount", AMOUNT_ALIASES)),
        };

        Ok(ColumnMapping {
            date,
            description,
            amount,
            category: find(CATEGORY_ALIASES),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CsvImportProfile {
    /// Tag stamped on every row; the stored file name.
    pub source: String,
    pub sign_policy: SignPolicy,
    pub delimiter: u8,
}

impl CsvImportProfile {
    pub fn new(source: impl Into<String>, sign_policy: SignPolicy) -> Self {
        Self {
            source: source.into(),
            sign_policy,
            delimiter: b',',
        }
    }
}

/// Rows of one file in canonical shape plus what was lost on the way.
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub source: String,
    pub rows: Vec<NormalizedTransaction>,
    /// Rows dropped for an unparseable date or amount.
    pub dropped: usize,
    pub sign_convention: SignConvention,
}

impl NormalizedBatch {
    pub fn accepted(&self) -> usize {
        self.rows.len()
    }
}

struct ParsedRow {
    row_index: usize,
    date: NaiveDate,
    description: String,
    amount: Money,
    bank_category: Option<String>,
}

pub fn normalize<R: Read>(data: R, profile: &CsvImportProfile) -> Result<NormalizedBatch, SchemaError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(profile.delimiter)
        .from_reader(data);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mapping = ColumnMapping::resolve(&headers)?;

    let mut parsed = Vec::new();
    let mut dropped = 0usize;

    for (row_index, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(source = %profile.source, row_index, "unreadable row: {e}");
                dropped += 1;
                continue;
            }
        };

        let Some(date) = record.get(mapping.date).and_then(parse_date) else {
            tracing::debug!(source = %profile.source, row_index, "dropping row with unparseable date");
            dropped += 1;
            continue;
        };

        let amount = match mapping.amount {
            AmountColumns::Signed(col) => record.get(col).and_then(parse_amount),
            AmountColumns::DebitCredit { debit, credit } => {
                let d = record.get(debit).and_then(parse_amount);
                let c = record.get(credit).and_then(parse_amount);
                match (d, c) {
                    (None, None) => None,
                    (d, c) => Some(c.unwrap_or_default().abs() - d.unwrap_or_default().abs()),
                }
            }
        };
        let Some(amount) = amount else {
            tracing::debug!(source = %profile.source, row_index, "dropping row with unparseable amount");
            dropped += 1;
            continue;
        };

        let description = record.get(mapping.description).unwrap_or_default().to_string();
        let bank_category = mapping
            .category
            .and_then(|col| record.get(col))
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        parsed.push(ParsedRow {
            row_index,
            date,
            description,
            amount,
            bank_category,
        });
    }

    let sign_convention = match (&mapping.amount, profile.sign_policy.fixed()) {
        (AmountColumns::DebitCredit { .. }, _) => SignConvention::NegativeIsSpend,
        (AmountColumns::Signed(_), Some(fixed)) => fixed,
        (AmountColumns::Signed(_), None) => {
            let amounts: Vec<Money> = parsed.iter().map(|r| r.amount).collect();
            let detected = detect_sign_convention(&amounts);
            if detected == SignConvention::PositiveIsSpend {
                tracing::warn!(
                    source = %profile.source,
                    "inferred positive-is-spend amounts from majority polarity; set an explicit sign policy if this is wrong"
                );
            }
            detected
        }
    };

    let rows = parsed
        .into_iter()
        .map(|r| {
            let amount_signed = match sign_convention {
                SignConvention::NegativeIsSpend => r.amount,
                SignConvention::PositiveIsSpend => -r.amount,
            };
            let merchant = normalize_merchant(&r.description);
            NormalizedTransaction {
                id: TransactionId::derive(r.date, &merchant, amount_signed, &profile.source, r.row_index),
                date: r.date,
                merchant,
                description: r.description,
                amount_signed,
                bank_category: r.bank_category,
                source: profile.source.clone(),
            }
        })
        .collect();

    Ok(NormalizedBatch {
        source: profile.source.clone(),
        rows,
        dropped,
        sign_convention,
    })
}

/// Majority polarity: an export where positive amounts outnumber negative
/// ones is assumed to record spend as positive.
pub fn detect_sign_convention(amounts: &[Money]) -> SignConvention {
    let positives = amounts.iter().filter(|a| a.is_positive()).count();
    let negatives = amounts.iter().filter(|a| a.is_negative()).count();
    if positives > negatives {
        SignConvention::PositiveIsSpend
    } else {
        SignConvention::NegativeIsSpend
    }
}

fn normalize_header(h: &str) -> String {
    h.trim_start_matches('\u{feff}').trim().to_lowercase()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

fn parse_amount(s: &str) -> Option<Money> {
    let s = s.trim();
    let (paren_negative, s) = match s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };
    let (trailing_negative, s) = match s.strip_suffix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | ' ' | '\u{a0}'))
        .collect();
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if cleaned.is_empty() {
        return None;
    }
    let mut dec = Decimal::from_str(cleaned).ok()?;
    if paren_negative || trailing_negative {
        dec = -dec;
    }
    Some(Money::from_decimal(dec))
}
