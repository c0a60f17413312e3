use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ScrapeError;
use crate::scraper::id::url_id;
use crate::storage::CompletionStore;

/// Record-file resumability: an append-only file lists the raw URL of every
/// completed fetch, one per line, and the completion set is derived by
/// hashing those lines.
///
/// Unlike directory listing this also protects against partially written
/// output files: the record line is only appended after the page file has
/// been renamed into place. Appends go through a mutex and a single
/// `write_all` per line, so concurrent workers never interleave partial
/// lines.
pub struct RecordStore {
    output_dir: PathBuf,
    record_path: PathBuf,
    appender: Mutex<File>,
}

impl RecordStore {
    pub async fn open(output_dir: &Path, record_path: &Path) -> Result<Self, ScrapeError> {
        fs::create_dir_all(output_dir).await?;
        if let Some(parent) = record_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let appender = OpenOptions::new()
            .create(true)
            .append(true)
            .open(record_path)
            .await?;

        debug!("Using completed-URLs record {}", record_path.display());
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            record_path: record_path.to_path_buf(),
            appender: Mutex::new(appender),
        })
    }
}

#[async_trait]
impl CompletionStore for RecordStore {
    async fn completed_ids(&self) -> Result<HashSet<String>, ScrapeError> {
        let contents = fs::read_to_string(&self.record_path).await?;
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(url_id)
            .collect())
    }

    async fn persist(&self, url: &str, content: &str) -> Result<(), ScrapeError> {
        let id = url_id(url);
        let tmp = self.output_dir.join(format!("{id}.html.tmp"));
        let dest = self.output_dir.join(format!("{id}.html"));

        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &dest).await?;

        // One write per line; the record only ever grows by whole lines.
        let line = format!("{url}\n");
        let mut file = self.appender.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Recorded {} as completed", url);
        Ok(())
    }
}
