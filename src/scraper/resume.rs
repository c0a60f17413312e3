use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::watch;
use tracing::info;

use crate::browser::SessionFactory;
use crate::error::ScrapeError;
use crate::scraper::id::url_id;
use crate::scraper::pool::WorkPool;
use crate::storage::CompletionStore;

/// Read the URL list: one URL per line, trimmed, blank lines skipped,
/// order preserved.
pub async fn read_url_list(path: &Path) -> Result<Vec<String>, ScrapeError> {
    let contents = fs::read_to_string(path).await?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// The URLs whose ids are not yet in the completion set, in list order.
/// Duplicate list entries collapse to one unit of work.
pub fn remaining_urls(urls: &[String], completed: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .filter(|url| !completed.contains(&url_id(url)))
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect()
}

/// Drives scraping rounds until the URL list is drained.
///
/// Every round recomputes the completion set from the store, never from a
/// cache, since the previous round was writing files concurrently. A crashed
/// or interrupted run can simply be restarted against the same list and
/// output location and will only fetch what is still missing.
pub struct ResumeTracker<F: SessionFactory> {
    urls_file: PathBuf,
    store: Arc<dyn CompletionStore>,
    pool: WorkPool<F>,
}

impl<F: SessionFactory> ResumeTracker<F> {
    pub fn new(urls_file: PathBuf, store: Arc<dyn CompletionStore>, pool: WorkPool<F>) -> Self {
        Self {
            urls_file,
            store,
            pool,
        }
    }

    /// Loop until no work remains.
    ///
    /// A round that completes zero URLs while work remains means every
    /// remaining URL is failing; surfacing `NoProgress` beats retrying
    /// forever.
    pub async fn run(&self, cancel: watch::Receiver<bool>) -> Result<(), ScrapeError> {
        let mut round = 0u64;
        loop {
            if *cancel.borrow() {
                return Err(ScrapeError::Cancelled);
            }

            let urls = read_url_list(&self.urls_file).await?;
            let completed = self.store.completed_ids().await?;
            let remaining = remaining_urls(&urls, &completed);

            if remaining.is_empty() {
                info!("All {} URLs completed, nothing left to scrape", urls.len());
                return Ok(());
            }

            round += 1;
            info!("Round {}: scraping {} URLs", round, remaining.len());

            let stats = self
                .pool
                .scrape(remaining.clone(), self.store.clone(), cancel.clone())
                .await?;

            if stats.completed == 0 {
                return Err(ScrapeError::NoProgress {
                    remaining: remaining.len(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::scraper::testing::FakeFactory;
    use crate::storage::{DirStore, MockCompletionStore};

    fn write_url_list(dir: &Path, urls: &[&str]) -> PathBuf {
        let path = dir.join("urls.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        for url in urls {
            writeln!(file, "{url}").unwrap();
        }
        path
    }

    fn no_cancel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[test]
    fn remaining_preserves_order_and_collapses_duplicates() {
        let urls: Vec<String> = ["https://a.example", "https://b.example", "https://a.example"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let remaining = remaining_urls(&urls, &HashSet::new());
        assert_eq!(remaining, vec!["https://a.example", "https://b.example"]);

        let completed: HashSet<String> = [url_id("https://a.example")].into_iter().collect();
        let remaining = remaining_urls(&urls, &completed);
        assert_eq!(remaining, vec!["https://b.example"]);
    }

    #[tokio::test]
    async fn url_list_is_trimmed_and_blank_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(&path, "https://a.example  \n\n  https://b.example\n").unwrap();

        let urls = read_url_list(&path).await.unwrap();
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
    }

    #[tokio::test]
    async fn drains_the_list_and_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let urls_file = write_url_list(dir.path(), &["https://a.example", "https://b.example"]);
        let output = dir.path().join("html");
        let store = Arc::new(DirStore::open(&output).await.unwrap());

        let factory = Arc::new(FakeFactory::succeeding());
        let pool = WorkPool::new(factory.clone(), 2, 20, None);
        let tracker = ResumeTracker::new(urls_file, store, pool);

        let (_cancel, rx) = no_cancel();
        tracker.run(rx).await.unwrap();

        for url in ["https://a.example", "https://b.example"] {
            let path = output.join(format!("{}.html", url_id(url)));
            let content = std::fs::read_to_string(path).unwrap();
            assert_eq!(content, format!("<html>{url}</html>"));
        }
        assert_eq!(factory.closed(), factory.created());
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let urls_file = write_url_list(dir.path(), &["https://a.example", "https://b.example"]);
        let output = dir.path().join("html");

        {
            let store = Arc::new(DirStore::open(&output).await.unwrap());
            let factory = Arc::new(FakeFactory::succeeding());
            let pool = WorkPool::new(factory, 2, 20, None);
            let (_cancel, rx) = no_cancel();
            ResumeTracker::new(urls_file.clone(), store, pool)
                .run(rx)
                .await
                .unwrap();
        }

        // Re-run against the same state: zero fetches, zero sessions.
        let store = Arc::new(DirStore::open(&output).await.unwrap());
        let factory = Arc::new(FakeFactory::succeeding());
        let pool = WorkPool::new(factory.clone(), 2, 20, None);
        let (_cancel, rx) = no_cancel();
        ResumeTracker::new(urls_file, store, pool)
            .run(rx)
            .await
            .unwrap();

        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn already_present_output_is_not_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let urls_file = write_url_list(dir.path(), &["https://a.example", "https://b.example"]);
        let output = dir.path().join("html");
        std::fs::create_dir_all(&output).unwrap();

        // Simulate a previous run having completed `a`.
        let existing = output.join(format!("{}.html", url_id("https://a.example")));
        std::fs::write(&existing, "from the previous run").unwrap();

        let store = Arc::new(DirStore::open(&output).await.unwrap());
        let factory = Arc::new(FakeFactory::succeeding());
        let pool = WorkPool::new(factory, 2, 20, None);
        let (_cancel, rx) = no_cancel();
        ResumeTracker::new(urls_file, store, pool)
            .run(rx)
            .await
            .unwrap();

        // `a` was skipped, its file untouched; `b` was fetched.
        assert_eq!(
            std::fs::read_to_string(existing).unwrap(),
            "from the previous run"
        );
        assert!(output
            .join(format!("{}.html", url_id("https://b.example")))
            .is_file());
    }

    #[tokio::test]
    async fn all_failures_surface_as_no_progress() {
        let dir = tempfile::tempdir().unwrap();
        let urls_file = write_url_list(dir.path(), &["https://a.example", "https://b.example"]);
        let output = dir.path().join("html");
        let store = Arc::new(DirStore::open(&output).await.unwrap());

        let factory = Arc::new(FakeFactory::failing_urls("example"));
        let pool = WorkPool::new(factory, 1, 0, None);
        let (_cancel, rx) = no_cancel();

        let result = ResumeTracker::new(urls_file, store, pool).run(rx).await;
        assert!(matches!(
            result,
            Err(ScrapeError::NoProgress { remaining: 2 })
        ));
    }

    #[tokio::test]
    async fn fully_completed_list_never_touches_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        let urls_file = write_url_list(dir.path(), &["https://a.example"]);

        let mut store = MockCompletionStore::new();
        store
            .expect_completed_ids()
            .returning(|| Ok([url_id("https://a.example")].into_iter().collect()));
        store.expect_persist().never();

        let factory = Arc::new(FakeFactory::succeeding());
        let pool = WorkPool::new(factory.clone(), 2, 20, None);
        let (_cancel, rx) = no_cancel();

        ResumeTracker::new(urls_file, Arc::new(store), pool)
            .run(rx)
            .await
            .unwrap();
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn cancelled_before_the_round_starts() {
        let dir = tempfile::tempdir().unwrap();
        let urls_file = write_url_list(dir.path(), &["https://a.example"]);
        let output = dir.path().join("html");
        let store = Arc::new(DirStore::open(&output).await.unwrap());

        let factory = Arc::new(FakeFactory::succeeding());
        let pool = WorkPool::new(factory, 1, 20, None);
        let (cancel, rx) = no_cancel();
        cancel.send(true).unwrap();

        let result = ResumeTracker::new(urls_file, store, pool).run(rx).await;
        assert!(matches!(result, Err(ScrapeError::Cancelled)));
    }
}
