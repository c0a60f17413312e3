use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::browser::{PageSession, SessionFactory};
use crate::error::ScrapeError;
use crate::scraper::session_pool::SessionPool;
use crate::storage::CompletionStore;

/// Outcome of one fetch, returned to the pool instead of raised across the
/// worker boundary. The pool decides centrally whether to keep going.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Page fetched and persisted.
    Completed { url: String, elapsed: Duration },

    /// Recoverable failure; the URL stays uncompleted and is retried on the
    /// next round.
    Failed { url: String, error: ScrapeError },

    /// The worker blew its failure budget and must stop accepting tasks.
    Exhausted {
        worker_id: usize,
        url: String,
        error: ScrapeError,
    },
}

/// Executes single fetches with the calling worker's session.
pub struct TaskRunner<F: SessionFactory> {
    sessions: Arc<SessionPool<F>>,
    store: Arc<dyn CompletionStore>,
    selector: Option<String>,
    fail_limit: usize,
}

impl<F: SessionFactory> Clone for TaskRunner<F> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            store: self.store.clone(),
            selector: self.selector.clone(),
            fail_limit: self.fail_limit,
        }
    }
}

impl<F: SessionFactory> TaskRunner<F> {
    pub fn new(
        sessions: Arc<SessionPool<F>>,
        store: Arc<dyn CompletionStore>,
        selector: Option<String>,
        fail_limit: usize,
    ) -> Self {
        Self {
            sessions,
            store,
            selector,
            fail_limit,
        }
    }

    /// Fetch one URL and persist the result.
    ///
    /// `failures` is the calling worker's cumulative failure counter; it is
    /// only ever incremented here and only reset by a worker restart. Once
    /// it exceeds the fail limit the outcome is `Exhausted` and the worker
    /// must not run further tasks.
    pub async fn run(&self, url: &str, worker_id: usize, failures: &mut usize) -> TaskOutcome {
        let started = Instant::now();
        info!("Getting data from: {}", url);

        match self.fetch_and_persist(url, worker_id).await {
            Ok(()) => {
                let elapsed = started.elapsed();
                info!(
                    "Processing finished of {} in {:.2} seconds",
                    url,
                    elapsed.as_secs_f64()
                );
                TaskOutcome::Completed {
                    url: url.to_string(),
                    elapsed,
                }
            }
            Err(error) => {
                *failures += 1;
                if *failures > self.fail_limit {
                    error!(
                        "Worker {} exceeded its failure limit ({} > {}), retiring: {}",
                        worker_id, failures, self.fail_limit, error
                    );
                    TaskOutcome::Exhausted {
                        worker_id,
                        url: url.to_string(),
                        error,
                    }
                } else {
                    warn!("Error scraping {}: {}", url, error);
                    TaskOutcome::Failed {
                        url: url.to_string(),
                        error,
                    }
                }
            }
        }
    }

    async fn fetch_and_persist(&self, url: &str, worker_id: usize) -> Result<(), ScrapeError> {
        let content = {
            let mut guard = self.sessions.get_or_create(worker_id).await?;
            guard.session().fetch(url, self.selector.as_deref()).await?
        };
        self.store.persist(url, &content).await
    }
}
