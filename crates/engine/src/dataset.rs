use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

use tally_core::{
    DateRange, RuleBook, SignConvention, SignPolicy, SourceFile, Transaction, TransactionId,
};
use tally_import::{normalize, Categorizer, CsvImportProfile};

/// Outcome of normalising one stored file during a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub name: String,
    pub accepted: usize,
    pub dropped: usize,
    pub sign_convention: Option<SignConvention>,
    /// Set when the file was skipped entirely.
    pub error: Option<String>,
}

/// One immutable, fully categorised view of every stored file.
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    transactions: Vec<Transaction>,
    files: Vec<FileReport>,
    orphaned_overrides: Vec<TransactionId>,
    built_at: DateTime<Utc>,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::empty()
    }
}

impl Dataset {
    pub fn empty() -> Self {
        Self {
            transactions: Vec::new(),
            files: Vec::new(),
            orphaned_overrides: Vec::new(),
            built_at: Utc::now(),
        }
    }

    /// Normalises and categorises `files` in order. Pure apart from logging:
    /// the same inputs always produce the same transactions.
    pub fn build(
        files: &[SourceFile],
        rules: &RuleBook,
        categorizer: &Categorizer,
        default_policy: SignPolicy,
    ) -> Self {
        let mut transactions = Vec::new();
        let mut reports = Vec::with_capacity(files.len());

        for file in files {
            let profile =
                CsvImportProfile::new(&file.name, file.sign_policy.unwrap_or(default_policy));
            match normalize(file.content.as_slice(), &profile) {
                Ok(batch) => {
                    debug!(
                        file = %file.name,
                        accepted = batch.accepted(),
                        dropped = batch.dropped,
                        "normalized file"
                    );
                    reports.push(FileReport {
                        name: file.name.clone(),
                        accepted: batch.accepted(),
                        dropped: batch.dropped,
                        sign_convention: Some(batch.sign_convention),
                        error: None,
                    });
                    transactions.extend(batch.rows.into_iter().map(|tx| {
                        let resolution = categorizer.categorize(&tx, rules);
                        Transaction::categorized(tx, resolution.category)
                    }));
                }
                Err(e) => {
                    warn!(file = %file.name, error = %e, "skipping unreadable file");
                    reports.push(FileReport {
                        name: file.name.clone(),
                        accepted: 0,
                        dropped: 0,
                        sign_convention: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let present: HashSet<&TransactionId> = transactions.iter().map(|t| &t.id).collect();
        let orphaned_overrides: Vec<TransactionId> = rules
            .one_off
            .iter()
            .filter(|(id, _)| !present.contains(id))
            .map(|(id, _)| id.clone())
            .collect();
        if !orphaned_overrides.is_empty() {
            warn!(
                count = orphaned_overrides.len(),
                "one-off overrides reference transactions that no longer exist"
            );
        }

        Self {
            transactions,
            files: reports,
            orphaned_overrides,
            built_at: Utc::now(),
        }
    }

    /// Transactions in file order, then row order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn files(&self) -> &[FileReport] {
        &self.files
    }

    pub fn file(&self, name: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Override ids that matched nothing in this build.
    pub fn orphaned_overrides(&self) -> &[TransactionId] {
        &self.orphaned_overrides
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn get(&self, id: &TransactionId) -> Option<&Transaction> {
        self.transactions.iter().find(|t| &t.id == id)
    }

    /// Distinct source tags, sorted.
    pub fn sources(&self) -> Vec<String> {
        self.transactions
            .iter()
            .map(|t| t.source.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn date_range(&self) -> Option<DateRange> {
        DateRange::spanning(self.transactions.iter().map(|t| t.date))
    }
}
