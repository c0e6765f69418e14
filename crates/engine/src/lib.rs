pub mod dataset;
pub mod forecast;
pub mod query;
pub mod service;
pub mod store;

pub use dataset::{Dataset, FileReport};
pub use forecast::{
    forecast, CategoryForecast, Forecast, ForecastRequest, ForecastStats, DEFAULT_MONTHS_LOOKBACK,
};
pub use query::{
    category_breakdown, daily_spend, merchants, summary, CategoryFilter, CategoryShare,
    DailySpend, MerchantSample, MerchantSummary, Scope, SortOrder, Summary, TransactionQuery,
    ALL_EXPENSES, ALL_SOURCES,
};
pub use service::{Engine, EngineError, EngineSettings, Upload, UploadReport, UploadedFile};
pub use store::{TransactionStore, WriteGuard};
