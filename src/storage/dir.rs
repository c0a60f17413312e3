use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::ScrapeError;
use crate::scraper::id::url_id;
use crate::storage::CompletionStore;

/// Directory-listing resumability: a URL counts as completed when
/// `<output_dir>/<url_id>.html` exists.
///
/// Pages are written to a `.html.tmp` sibling first and renamed into place,
/// so a crash mid-write never leaves a file that the next round would count
/// as completed.
pub struct DirStore {
    output_dir: PathBuf,
}

impl DirStore {
    pub async fn open(output_dir: &Path) -> Result<Self, ScrapeError> {
        fs::create_dir_all(output_dir).await?;
        debug!("Using output directory {}", output_dir.display());
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    fn final_path(&self, id: &str) -> PathBuf {
        self.output_dir.join(format!("{id}.html"))
    }

    fn tmp_path(&self, id: &str) -> PathBuf {
        self.output_dir.join(format!("{id}.html.tmp"))
    }
}

#[async_trait]
impl CompletionStore for DirStore {
    async fn completed_ids(&self) -> Result<HashSet<String>, ScrapeError> {
        let mut ids = HashSet::new();
        let mut entries = fs::read_dir(&self.output_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "html") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.insert(stem.to_string());
                }
            }
        }

        Ok(ids)
    }

    async fn persist(&self, url: &str, content: &str) -> Result<(), ScrapeError> {
        let id = url_id(url);
        let tmp = self.tmp_path(&id);

        fs::write(&tmp, content).await?;
        fs::rename(&tmp, self.final_path(&id)).await?;

        debug!("Saved {} as {}.html", url, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn persist_then_completed() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).await.unwrap();

        assert_ok!(store.persist("https://a.example", "<html>a</html>").await);

        let ids = store.completed_ids().await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains(&url_id("https://a.example")));

        let saved = std::fs::read_to_string(
            dir.path().join(format!("{}.html", url_id("https://a.example"))),
        )
        .unwrap();
        assert_eq!(saved, "<html>a</html>");
    }

    #[tokio::test]
    async fn partial_writes_are_not_completed() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).await.unwrap();

        // A leftover tmp file from a crashed run must not count.
        std::fs::write(dir.path().join("deadbeef.html.tmp"), "partial").unwrap();
        // Unrelated files are ignored too.
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();

        assert!(store.completed_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persist_is_idempotent_per_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).await.unwrap();

        store.persist("https://a.example", "v1").await.unwrap();
        store.persist("https://a.example", "v2").await.unwrap();

        let ids = store.completed_ids().await.unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("html").join("files");
        let store = DirStore::open(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(store.completed_ids().await.unwrap().is_empty());
    }
}
