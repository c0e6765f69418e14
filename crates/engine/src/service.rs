use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, instrument, warn};

use tally_core::{Category, MerchantRules, OneOffOverrides, SignConvention, SignPolicy, TransactionId};
use tally_import::{normalize, normalize_merchant, Categorizer, CsvImportProfile};
use tally_storage::{self as storage, DbPool, StorageError, StoredFile};

use crate::dataset::Dataset;
use crate::store::{TransactionStore, WriteGuard};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub categorizer: Categorizer,
    /// Applied to files uploaded without an explicit policy.
    pub default_sign_policy: SignPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            categorizer: Categorizer::default(),
            default_sign_policy: SignPolicy::NegativeIsSpend,
        }
    }
}

/// A file as handed over by an upload collaborator.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content: Vec<u8>,
    pub sign_policy: Option<SignPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedFile {
    pub filename: String,
    /// Name it was stored under; `None` if rejected.
    pub stored_as: Option<String>,
    pub accepted: usize,
    pub dropped: usize,
    pub sign_convention: Option<SignConvention>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadReport {
    pub files: Vec<UploadedFile>,
    pub transactions_count: usize,
}

impl UploadReport {
    pub fn stored(&self) -> impl Iterator<Item = &str> {
        self.files.iter().filter_map(|f| f.stored_as.as_deref())
    }
}

/// Single entry point for every read and write against the expense data.
///
/// Every mutation persists first, then rebuilds the dataset from what is
/// stored and swaps it in. A failed rebuild leaves the previous snapshot live.
pub struct Engine {
    pool: DbPool,
    store: TransactionStore,
    settings: EngineSettings,
}

impl Engine {
    /// Loads persisted state and builds the first snapshot.
    pub async fn open(pool: DbPool, settings: EngineSettings) -> Result<Self, EngineError> {
        let engine = Self {
            pool,
            store: TransactionStore::default(),
            settings,
        };
        engine.rebuild().await?;
        Ok(engine)
    }

    pub async fn snapshot(&self) -> Arc<Dataset> {
        self.store.snapshot().await
    }

    pub async fn rebuild(&self) -> Result<Arc<Dataset>, EngineError> {
        let guard = self.store.begin_write().await;
        self.rebuild_locked(&guard).await
    }

    #[instrument(skip_all)]
    async fn rebuild_locked(&self, guard: &WriteGuard<'_>) -> Result<Arc<Dataset>, EngineError> {
        let started = Instant::now();
        let files = storage::get_source_files(&self.pool).await?;
        let rules = storage::get_rule_book(&self.pool).await?;
        let dataset = Dataset::build(
            &files,
            &rules,
            &self.settings.categorizer,
            self.settings.default_sign_policy,
        );
        info!(
            files = files.len(),
            transactions = dataset.len(),
            dropped = dataset.files().iter().map(|f| f.dropped).sum::<usize>(),
            merchant_rules = rules.merchants.len(),
            overrides = rules.one_off.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "dataset rebuilt"
        );
        Ok(self.store.publish(guard, dataset).await)
    }

    // ── source files ──

    /// Validates and stores each file, then rebuilds once.
    ///
    /// A file that fails schema checks is reported and skipped; the others
    /// are still stored.
    #[instrument(skip_all, fields(count = uploads.len()))]
    pub async fn upload(&self, uploads: Vec<Upload>) -> Result<UploadReport, EngineError> {
        if uploads.is_empty() {
            return Err(EngineError::InvalidInput("No files provided".into()));
        }

        let guard = self.store.begin_write().await;
        let mut files = Vec::with_capacity(uploads.len());
        let mut storage_failure = None;
        for upload in uploads {
            let filename = upload.filename.clone();
            match self.store_upload(upload).await {
                Ok(file) => files.push(file),
                Err(e) => {
                    warn!(file = %filename, error = %e, "failed to store upload");
                    files.push(rejected(filename, &e));
                    storage_failure.get_or_insert(e);
                }
            }
        }
        // Nothing committed: surface the storage fault.
        if let Some(e) = storage_failure.filter(|_| files.iter().all(|f| f.stored_as.is_none())) {
            return Err(e);
        }

        let dataset = if files.iter().any(|f| f.stored_as.is_some()) {
            self.rebuild_locked(&guard).await?
        } else {
            self.store.snapshot().await
        };

        for file in &mut files {
            if let Some(report) = file.stored_as.as_deref().and_then(|n| dataset.file(n)) {
                file.accepted = report.accepted;
                file.dropped = report.dropped;
                file.sign_convention = report.sign_convention;
            }
        }

        Ok(UploadReport {
            files,
            transactions_count: dataset.len(),
        })
    }

    async fn store_upload(&self, upload: Upload) -> Result<UploadedFile, EngineError> {
        let policy = upload.sign_policy.unwrap_or(self.settings.default_sign_policy);
        let probe = CsvImportProfile::new(&upload.filename, policy);
        if let Err(e) = normalize(upload.content.as_slice(), &probe) {
            warn!(file = %upload.filename, error = %e, "rejected upload");
            return Ok(rejected(upload.filename, &e));
        }

        let stored = storage::insert_source_file(
            &self.pool,
            &upload.filename,
            &upload.content,
            upload.sign_policy,
        )
        .await?;
        info!(file = %upload.filename, stored_as = %stored, "stored upload");

        Ok(UploadedFile {
            filename: upload.filename,
            stored_as: Some(stored),
            accepted: 0,
            dropped: 0,
            sign_convention: None,
            error: None,
        })
    }

    /// Removes a stored file and rebuilds. Returns the remaining file names.
    pub async fn delete_file(&self, name: &str) -> Result<Vec<String>, EngineError> {
        let guard = self.store.begin_write().await;
        if !storage::delete_source_file(&self.pool, name).await? {
            return Err(EngineError::NotFound(format!("File '{name}'")));
        }
        info!(file = %name, "deleted file");
        self.rebuild_locked(&guard).await?;
        Ok(self.list_files().await?.into_iter().map(|f| f.name).collect())
    }

    pub async fn list_files(&self) -> Result<Vec<StoredFile>, EngineError> {
        Ok(storage::list_source_files(&self.pool).await?)
    }

    // ── merchant rules ──

    pub async fn merchant_rules(&self) -> Result<MerchantRules, EngineError> {
        Ok(storage::get_merchant_rules(&self.pool).await?)
    }

    /// Pins every transaction from `merchant` to `category`. The merchant is
    /// normalised the same way statement descriptions are; the stored key is
    /// returned.
    pub async fn set_merchant_rule(
        &self,
        merchant: &str,
        category: Category,
    ) -> Result<String, EngineError> {
        let key = merchant_key(merchant)?;
        let guard = self.store.begin_write().await;
        storage::save_merchant_rule(&self.pool, &key, category).await?;
        info!(merchant = %key, %category, "saved merchant rule");
        self.rebuild_locked(&guard).await?;
        Ok(key)
    }

    pub async fn remove_merchant_rule(&self, merchant: &str) -> Result<(), EngineError> {
        let key = merchant_key(merchant)?;
        let guard = self.store.begin_write().await;
        if !storage::delete_merchant_rule(&self.pool, &key).await? {
            return Err(EngineError::NotFound(format!("Merchant rule '{key}'")));
        }
        info!(merchant = %key, "removed merchant rule");
        self.rebuild_locked(&guard).await?;
        Ok(())
    }

    // ── one-off overrides ──

    pub async fn one_off_overrides(&self) -> Result<OneOffOverrides, EngineError> {
        Ok(storage::get_one_off_overrides(&self.pool).await?)
    }

    pub async fn set_one_off_override(
        &self,
        id: &TransactionId,
        category: Category,
    ) -> Result<(), EngineError> {
        if id.as_str().is_empty() {
            return Err(EngineError::InvalidInput("txn_id is required".into()));
        }
        let guard = self.store.begin_write().await;
        storage::save_one_off_override(&self.pool, id, category).await?;
        info!(txn_id = %id, %category, "saved one-off override");
        self.rebuild_locked(&guard).await?;
        Ok(())
    }

    pub async fn remove_one_off_override(&self, id: &TransactionId) -> Result<(), EngineError> {
        let guard = self.store.begin_write().await;
        if !storage::delete_one_off_override(&self.pool, id).await? {
            return Err(EngineError::NotFound(format!("Override for '{id}'")));
        }
        info!(txn_id = %id, "removed one-off override");
        self.rebuild_locked(&guard).await?;
        Ok(())
    }
}

fn merchant_key(merchant: &str) -> Result<String, EngineError> {
    let key = normalize_merchant(merchant);
    if key.is_empty() {
        return Err(EngineError::InvalidInput("merchant is required".into()));
    }
    Ok(key)
}

fn rejected(filename: String, error: &impl std::fmt::Display) -> UploadedFile {
    UploadedFile {
        filename,
        stored_as: None,
        accepted: 0,
        dropped: 0,
        sign_convention: None,
        error: Some(error.to_string()),
    }
}
