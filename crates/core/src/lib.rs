pub mod category;
pub mod money;
pub mod period;
pub mod rules;
pub mod source;
pub mod transaction;

pub use category::{Category, ParseCategoryError, ALL_CATEGORIES};
pub use money::Money;
pub use period::{DateRange, ParsePeriodError, YearMonth};
pub use rules::{MerchantRules, OneOffOverrides, RuleBook};
pub use source::{SignConvention, SignPolicy, SourceFile};
pub use transaction::{NormalizedTransaction, Transaction, TransactionId};
