pub mod dir;
pub mod record;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::cli::config::{ResumeStrategy, StorageSettings};
use crate::error::ScrapeError;

// Re-export common types
pub use dir::DirStore;
pub use record::RecordStore;

/// Persistence and resumability backend for completed fetches.
///
/// Exactly one implementation is active per run. `persist` must only make a
/// URL observable as completed once its content is fully written, and
/// `completed_ids` is recomputed at the start of every round, never cached.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionStore: Send + Sync {
    /// The set of URL ids already satisfied by previous rounds or runs.
    async fn completed_ids(&self) -> Result<HashSet<String>, ScrapeError>;

    /// Persist one successfully fetched page.
    async fn persist(&self, url: &str, content: &str) -> Result<(), ScrapeError>;
}

/// Factory selecting the completion store configured for this deployment.
pub struct CompletionStoreFactory;

impl CompletionStoreFactory {
    /// Create the store selected by `settings.resume`.
    pub async fn create(settings: &StorageSettings) -> Result<Arc<dyn CompletionStore>> {
        match settings.resume {
            ResumeStrategy::Directory => {
                let store = DirStore::open(&settings.output_dir).await?;
                Ok(Arc::new(store))
            }
            ResumeStrategy::RecordFile => {
                let record_path = settings.completed_urls_path();
                let store = RecordStore::open(&settings.output_dir, &record_path).await?;
                Ok(Arc::new(store))
            }
        }
    }
}
