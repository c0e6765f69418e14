use serde::Deserialize;
use thiserror::Error;

use tally_core::{Category, NormalizedTransaction, RuleBook};

use crate::fuzzy;

pub const DEFAULT_FUZZY_THRESHOLD: f32 = 85.0;

/// Which signal decided a transaction's category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    OneOffOverride,
    MerchantRule,
    Keyword,
    Fuzzy,
    BankCategory,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub category: Category,
    pub tier: Tier,
}

/// Lowercase substring → category. Order matters: first hit wins.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordRule {
    pub keyword: String,
    pub category: Category,
}

impl KeywordRule {
    pub fn new(keyword: &str, category: Category) -> Self {
        Self {
            keyword: keyword.trim().to_lowercase(),
            category,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceMerchant {
    pub name: String,
    pub category: Category,
}

const DEFAULT_KEYWORDS: &[(&str, Category)] = &[
    // Transfers first so card payments never land in a spend bucket.
    ("payment thank you", Category::Exclude),
    ("autopay", Category::Exclude),
    ("online transfer", Category::Exclude),
    ("transfer to", Category::Exclude),
    ("transfer from", Category::Exclude),
    ("credit card payment", Category::Exclude),
    ("zelle", Category::Exclude),
    ("venmo", Category::Exclude),
    ("payroll", Category::Income),
    ("direct dep", Category::Income),
    ("salary", Category::Income),
    ("interest paid", Category::Income),
    ("refund", Category::Income),
    ("trader joe", Category::Groceries),
    ("whole foods", Category::Groceries),
    ("safeway", Category::Groceries),
    ("kroger", Category::Groceries),
    ("costco", Category::Groceries),
    ("aldi", Category::Groceries),
    ("grocery", Category::Groceries),
    ("supermarket", Category::Groceries),
    ("farmers market", Category::Groceries),
    ("starbucks", Category::Dining),
    ("coffee", Category::Dining),
    ("restaurant", Category::Dining),
    ("doordash", Category::Dining),
    ("grubhub", Category::Dining),
    ("uber eats", Category::Dining),
    ("chipotle", Category::Dining),
    ("pizza", Category::Dining),
    ("cafe", Category::Dining),
    ("netflix", Category::Entertainment),
    ("hulu", Category::Entertainment),
    ("disney+", Category::Entertainment),
    ("amc theat", Category::Entertainment),
    ("amc online", Category::Entertainment),
    ("ticketmaster", Category::Entertainment),
    ("steampowered", Category::Entertainment),
    ("steam games", Category::Entertainment),
    ("spotify", Category::Subscriptions),
    ("apple.com/bill", Category::Subscriptions),
    ("patreon", Category::Subscriptions),
    ("subscription", Category::Subscriptions),
    ("amazon", Category::Shopping),
    ("amzn", Category::Shopping),
    ("target.com", Category::Shopping),
    ("target store", Category::Shopping),
    ("target t-", Category::Shopping),
    ("walmart", Category::Shopping),
    ("best buy", Category::Shopping),
    ("ikea", Category::Shopping),
    ("uber", Category::Transportation),
    ("lyft", Category::Transportation),
    ("shell oil", Category::Transportation),
    ("shell service", Category::Transportation),
    ("chevron", Category::Transportation),
    ("exxon", Category::Transportation),
    ("parking", Category::Transportation),
    ("transit", Category::Transportation),
    ("airlines", Category::Travel),
    ("airbnb", Category::Travel),
    ("hotel", Category::Travel),
    ("marriott", Category::Travel),
    ("expedia", Category::Travel),
    ("comcast", Category::Utilities),
    ("xfinity", Category::Utilities),
    ("verizon", Category::Utilities),
    ("at&t", Category::Utilities),
    ("electric", Category::Utilities),
    ("water dept", Category::Utilities),
    ("water utility", Category::Utilities),
    ("water district", Category::Utilities),
    ("pg&e", Category::Utilities),
    ("rent payment", Category::Housing),
    ("property mgmt", Category::Housing),
    ("mortgage", Category::Housing),
    ("hoa dues", Category::Housing),
    ("pharmacy", Category::Health),
    ("cvs", Category::Health),
    ("walgreens", Category::Health),
    ("dental", Category::Health),
    ("medical", Category::Health),
    ("planet fitness", Category::Health),
    ("gym membership", Category::Health),
    ("tuition", Category::Education),
    ("coursera", Category::Education),
    ("udemy", Category::Education),
    ("bookstore", Category::Education),
    ("service fee", Category::Fees),
    ("late fee", Category::Fees),
    ("annual fee", Category::Fees),
    ("atm fee", Category::Fees),
    ("foreign transaction fee", Category::Fees),
    ("overdraft", Category::Fees),
    ("interest charge", Category::Fees),
];

const DEFAULT_REFERENCE_MERCHANTS: &[(&str, Category)] = &[
    ("TRADER JOE'S", Category::Groceries),
    ("WHOLE FOODS MARKET", Category::Groceries),
    ("SAFEWAY", Category::Groceries),
    ("STARBUCKS", Category::Dining),
    ("BLUE BOTTLE COFFEE", Category::Dining),
    ("MCDONALD'S", Category::Dining),
    ("NETFLIX.COM", Category::Entertainment),
    ("SPOTIFY USA", Category::Subscriptions),
    ("AMAZON MKTPL", Category::Shopping),
    ("UBER TRIP", Category::Transportation),
    ("DELTA AIR LINES", Category::Travel),
    ("COMCAST CABLE", Category::Utilities),
    ("CVS PHARMACY", Category::Health),
];

/// Bank-provided labels that do not already equal a canonical category.
const BANK_CATEGORY_MAP: &[(&str, Category)] = &[
    ("food & drink", Category::Dining),
    ("restaurants", Category::Dining),
    ("groceries", Category::Groceries),
    ("supermarkets", Category::Groceries),
    ("gas", Category::Transportation),
    ("gas & fuel", Category::Transportation),
    ("auto & transport", Category::Transportation),
    ("travel", Category::Travel),
    ("airfare", Category::Travel),
    ("bills & utilities", Category::Utilities),
    ("home", Category::Housing),
    ("health & wellness", Category::Health),
    ("personal care", Category::Health),
    ("merchandise", Category::Shopping),
    ("shopping", Category::Shopping),
    ("entertainment", Category::Entertainment),
    ("fees & adjustments", Category::Fees),
    ("education", Category::Education),
    ("transfer", Category::Exclude),
    ("payment", Category::Exclude),
    ("credit card payment", Category::Exclude),
    ("income", Category::Income),
    ("paycheck", Category::Income),
];

#[derive(Debug, Error)]
pub enum RuleConfigError {
    #[error("Failed to parse rule file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Rule for '{name}': {source}")]
    Category {
        name: String,
        #[source]
        source: tally_core::ParseCategoryError,
    },
    #[error("Empty keyword in rule file")]
    EmptyKeyword,
    #[error("Fuzzy threshold must be within 0..=100, got {0}")]
    Threshold(f32),
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    fuzzy_threshold: Option<f32>,
    #[serde(default)]
    keyword: Vec<RawRule>,
    #[serde(default)]
    reference_merchant: Vec<RawMerchant>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    keyword: String,
    category: String,
}

#[derive(Debug, Deserialize)]
struct RawMerchant {
    name: String,
    category: String,
}

type Resolver = fn(&Categorizer, &NormalizedTransaction, &RuleBook) -> Option<Category>;

const RESOLVERS: &[(Tier, Resolver)] = &[
    (Tier::OneOffOverride, Categorizer::by_override),
    (Tier::MerchantRule, Categorizer::by_merchant_rule),
    (Tier::Keyword, Categorizer::by_keyword),
    (Tier::Fuzzy, Categorizer::by_fuzzy),
    (Tier::BankCategory, Categorizer::by_bank_category),
];

/// The layered category resolver. Stateless across calls: the same
/// transaction and rule book always resolve to the same category.
#[derive(Debug, Clone)]
pub struct Categorizer {
    keywords: Vec<KeywordRule>,
    reference: Vec<ReferenceMerchant>,
    fuzzy_threshold: f32,
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_KEYWORDS
                .iter()
                .map(|(k, c)| KeywordRule::new(k, *c))
                .collect(),
            DEFAULT_REFERENCE_MERCHANTS
                .iter()
                .map(|(n, c)| ReferenceMerchant {
                    name: n.to_string(),
                    category: *c,
                })
                .collect(),
        )
    }
}

impl Categorizer {
    pub fn new(keywords: Vec<KeywordRule>, reference: Vec<ReferenceMerchant>) -> Self {
        Self {
            keywords,
            reference,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f32) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn fuzzy_threshold(&self) -> f32 {
        self.fuzzy_threshold
    }

    pub fn keywords(&self) -> &[KeywordRule] {
        &self.keywords
    }

    /// Loads a keyword table from TOML, replacing the built-in one.
    ///
    /// ```toml
    /// fuzzy_threshold = 85.0
    ///
    /// [[keyword]]
    /// keyword = "trader joe"
    /// category = "Groceries"
    ///
    /// [[reference_merchant]]
    /// name = "BLUE BOTTLE COFFEE"
    /// category = "Dining"
    /// ```
    pub fn from_toml(toml_content: &str) -> Result<Self, RuleConfigError> {
        let file: RuleFile = toml::from_str(toml_content)?;

        let parse = |name: &str, label: &str| {
            label.parse::<Category>().map_err(|source| RuleConfigError::Category {
                name: name.to_string(),
                source,
            })
        };

        let mut keywords = Vec::with_capacity(file.keyword.len());
        for raw in &file.keyword {
            if raw.keyword.trim().is_empty() {
                return Err(RuleConfigError::EmptyKeyword);
            }
            keywords.push(KeywordRule::new(&raw.keyword, parse(&raw.keyword, &raw.category)?));
        }

        let mut reference = Vec::with_capacity(file.reference_merchant.len());
        for raw in &file.reference_merchant {
            reference.push(ReferenceMerchant {
                name: raw.name.trim().to_string(),
                category: parse(&raw.name, &raw.category)?,
            });
        }

        let threshold = file.fuzzy_threshold.unwrap_or(DEFAULT_FUZZY_THRESHOLD);
        if !(0.0..=100.0).contains(&threshold) {
            return Err(RuleConfigError::Threshold(threshold));
        }

        Ok(Self::new(keywords, reference).with_fuzzy_threshold(threshold))
    }

    /// Resolves the category of one transaction, first matching tier wins.
    pub fn categorize(&self, tx: &NormalizedTransaction, rules: &RuleBook) -> Resolution {
        RESOLVERS
            .iter()
            .find_map(|(tier, resolve)| {
                resolve(self, tx, rules).map(|category| Resolution { category, tier: *tier })
            })
            .unwrap_or_else(|| Resolution {
                category: default_category(tx),
                tier: Tier::Default,
            })
    }

    fn by_override(&self, tx: &NormalizedTransaction, rules: &RuleBook) -> Option<Category> {
        rules.one_off.get(&tx.id)
    }

    fn by_merchant_rule(&self, tx: &NormalizedTransaction, rules: &RuleBook) -> Option<Category> {
        rules.merchants.get(&tx.merchant)
    }

    fn by_keyword(&self, tx: &NormalizedTransaction, _rules: &RuleBook) -> Option<Category> {
        let description = tx.description.to_lowercase();
        let merchant = tx.merchant.to_lowercase();
        self.keywords
            .iter()
            .find(|k| description.contains(&k.keyword) || merchant.contains(&k.keyword))
            .map(|k| k.category)
    }

    fn by_fuzzy(&self, tx: &NormalizedTransaction, rules: &RuleBook) -> Option<Category> {
        let candidates = rules.merchants.iter().chain(
            self.reference
                .iter()
                .map(|r| (r.name.as_str(), r.category)),
        );
        fuzzy::best_match(
            &[tx.merchant.as_str(), tx.description.as_str()],
            candidates,
            self.fuzzy_threshold,
        )
        .map(|m| m.category)
    }

    fn by_bank_category(&self, tx: &NormalizedTransaction, _rules: &RuleBook) -> Option<Category> {
        tx.bank_category.as_deref().and_then(map_bank_category)
    }
}

/// Maps a bank-provided label onto a canonical category, if recognised.
pub fn map_bank_category(label: &str) -> Option<Category> {
    let wanted = label.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    BANK_CATEGORY_MAP
        .iter()
        .find(|(k, _)| *k == wanted)
        .map(|(_, c)| *c)
        .or_else(|| wanted.parse().ok())
}

fn default_category(tx: &NormalizedTransaction) -> Category {
    if tx.amount_signed.is_positive() {
        Category::Income
    } else {
        Category::Other
    }
}
