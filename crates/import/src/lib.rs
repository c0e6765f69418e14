pub mod csv;
pub mod fuzzy;
pub mod merchant;
pub mod rules;
pub(crate) mod util;

pub use csv::{
    detect_sign_convention, normalize, AmountColumns, ColumnMapping, CsvImportProfile,
    NormalizedBatch, SchemaError,
};
pub use merchant::normalize_merchant;
pub use rules::{
    map_bank_category, Categorizer, KeywordRule, ReferenceMerchant, Resolution, RuleConfigError,
    Tier, DEFAULT_FUZZY_THRESHOLD,
};
