use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::browser::SessionFactory;
use crate::error::ScrapeError;
use crate::scraper::session_pool::SessionPool;
use crate::scraper::task::{TaskOutcome, TaskRunner};
use crate::storage::CompletionStore;

/// What one scraping round achieved.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundStats {
    pub completed: usize,
    pub failed: usize,
    pub exhausted_workers: usize,
}

/// Bounded-concurrency scheduler for one scraping round.
///
/// URLs are drawn from a shared queue by a fixed number of workers, so no
/// worker is pinned to a URL subset in advance. Results are collected as
/// they complete; ordering across workers is not guaranteed and does not
/// matter, since persistence is per URL.
pub struct WorkPool<F: SessionFactory> {
    factory: Arc<F>,
    workers: usize,
    fail_limit: usize,
    selector: Option<String>,
}

impl<F: SessionFactory> WorkPool<F> {
    pub fn new(
        factory: Arc<F>,
        workers: usize,
        fail_limit: usize,
        selector: Option<String>,
    ) -> Self {
        Self {
            factory,
            workers: workers.max(1),
            fail_limit,
            selector,
        }
    }

    /// Run one round over `urls`, persisting successes through `store`.
    ///
    /// Stop conditions, evaluated as results arrive:
    /// - a worker reporting `Exhausted` stops new scheduling; in-flight
    ///   tasks drain and the round ends early but cleanly;
    /// - a cancellation signal stops scheduling immediately, abandons
    ///   in-flight tasks and propagates as `ScrapeError::Cancelled`.
    ///
    /// On every exit path, all sessions created during the round are
    /// released before this returns.
    pub async fn scrape(
        &self,
        urls: Vec<String>,
        store: Arc<dyn CompletionStore>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RoundStats, ScrapeError> {
        if *cancel.borrow() {
            return Err(ScrapeError::Cancelled);
        }

        let total = urls.len();
        let sessions = Arc::new(SessionPool::new(self.factory.clone(), self.workers));
        let runner = TaskRunner::new(
            sessions.clone(),
            store,
            self.selector.clone(),
            self.fail_limit,
        );

        // Preload the whole round; capacity == total so sends never block.
        let (task_tx, task_rx) = mpsc::channel(total.max(1));
        for url in urls {
            let _ = task_tx.send(url).await;
        }
        drop(task_tx);
        let queue = Arc::new(Mutex::new(task_rx));

        let (result_tx, mut result_rx) = mpsc::channel::<TaskOutcome>(total.max(1));
        let stop = Arc::new(AtomicBool::new(false));

        debug!("Starting {} workers for {} URLs", self.workers, total);
        let mut handles = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let queue = queue.clone();
            let runner = runner.clone();
            let results = result_tx.clone();
            let stop = stop.clone();

            handles.push(tokio::spawn(async move {
                let mut failures = 0usize;
                loop {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let url = {
                        let mut rx = queue.lock().await;
                        rx.recv().await
                    };
                    let Some(url) = url else { break };

                    let outcome = runner.run(&url, worker_id, &mut failures).await;
                    let fatal = matches!(outcome, TaskOutcome::Exhausted { .. });
                    if results.send(outcome).await.is_err() {
                        break;
                    }
                    if fatal {
                        break;
                    }
                }
                debug!("Worker {} stopped", worker_id);
            }));
        }
        drop(result_tx);

        let mut stats = RoundStats::default();
        let outcome: Result<(), ScrapeError> = loop {
            tokio::select! {
                result = result_rx.recv() => match result {
                    Some(TaskOutcome::Completed { url, elapsed }) => {
                        debug!("Completed {} in {:.2}s", url, elapsed.as_secs_f64());
                        stats.completed += 1;
                    }
                    Some(TaskOutcome::Failed { .. }) => {
                        // Already logged by the runner; just counted here.
                        stats.failed += 1;
                    }
                    Some(TaskOutcome::Exhausted { worker_id, url, error }) => {
                        stats.failed += 1;
                        stats.exhausted_workers += 1;
                        error!(
                            "Worker {} retired on {} ({}); winding the pool down",
                            worker_id, url, error
                        );
                        stop.store(true, Ordering::Relaxed);
                    }
                    None => break Ok(()),
                },
                changed = cancel.changed() => {
                    if changed.is_ok() && *cancel.borrow() {
                        warn!("Cancellation received, abandoning in-flight tasks");
                        stop.store(true, Ordering::Relaxed);
                        for handle in &handles {
                            handle.abort();
                        }
                        break Err(ScrapeError::Cancelled);
                    }
                }
            }
        };

        for handle in handles {
            // Aborted handles return a JoinError; nothing to do with it.
            let _ = handle.await;
        }

        // The teardown guarantee: no session survives the round.
        sessions.shutdown().await;

        match outcome {
            Ok(()) => {
                info!(
                    "Round finished: {} completed, {} failed, {} worker(s) retired",
                    stats.completed, stats.failed, stats.exhausted_workers
                );
                Ok(stats)
            }
            Err(e) => Err(e),
        }
    }
}
