use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::dataset::Dataset;

/// Proof that the caller holds the store's single writer slot.
pub struct WriteGuard<'a> {
    _slot: MutexGuard<'a, ()>,
}

/// Holds the active dataset as a swappable snapshot.
///
/// Readers clone the current `Arc` and never see a half-built dataset;
/// writers serialise on one mutex and replace the whole snapshot at once.
pub struct TransactionStore {
    current: RwLock<Arc<Dataset>>,
    writer: Mutex<()>,
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new(Dataset::empty())
    }
}

impl TransactionStore {
    pub fn new(initial: Dataset) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            writer: Mutex::new(()),
        }
    }

    pub async fn snapshot(&self) -> Arc<Dataset> {
        self.current.read().await.clone()
    }

    /// Waits for any running rebuild to finish, then claims the writer slot.
    pub async fn begin_write(&self) -> WriteGuard<'_> {
        WriteGuard {
            _slot: self.writer.lock().await,
        }
    }

    /// Swaps in a freshly built dataset and returns it.
    pub async fn publish(&self, _guard: &WriteGuard<'_>, dataset: Dataset) -> Arc<Dataset> {
        let next = Arc::new(dataset);
        *self.current.write().await = Arc::clone(&next);
        next
    }
}
