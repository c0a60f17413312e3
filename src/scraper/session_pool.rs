use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::browser::{PageSession, SessionFactory};
use crate::error::ScrapeError;

/// Per-worker session registry.
///
/// Each worker id owns one slot; the session in it is created on first use
/// and reused for every task that worker runs. Creation is synchronized per
/// slot, not globally, so one worker starting a browser never blocks the
/// others. Sessions never move between slots.
pub struct SessionPool<F: SessionFactory> {
    factory: Arc<F>,
    slots: Vec<Mutex<Option<F::Session>>>,
    live: AtomicUsize,
}

impl<F: SessionFactory> SessionPool<F> {
    pub fn new(factory: Arc<F>, workers: usize) -> Self {
        Self {
            factory,
            slots: (0..workers).map(|_| Mutex::new(None)).collect(),
            live: AtomicUsize::new(0),
        }
    }

    /// Lock the worker's slot, creating its session first if needed.
    ///
    /// The returned guard keeps the slot locked, so a worker's session is
    /// never touched by two tasks at once. A creation failure leaves the
    /// slot empty; the next task retries.
    pub async fn get_or_create(
        &self,
        worker_id: usize,
    ) -> Result<SessionGuard<'_, F>, ScrapeError> {
        let mut guard = self.slots[worker_id].lock().await;
        if guard.is_none() {
            let session = self.factory.create(worker_id).await?;
            self.live.fetch_add(1, Ordering::SeqCst);
            *guard = Some(session);
        }
        Ok(SessionGuard { guard })
    }

    /// Release every live session exactly once.
    ///
    /// Called on every exit path of a scraping round; after it returns no
    /// browser or display process created through this pool is left running.
    pub async fn shutdown(&self) {
        let results = join_all(self.slots.iter().map(|slot| async {
            let mut guard = slot.lock().await;
            match guard.take() {
                Some(mut session) => {
                    if let Err(e) = session.close().await {
                        warn!("Error closing session: {}", e);
                    }
                    self.live.fetch_sub(1, Ordering::SeqCst);
                    true
                }
                None => false,
            }
        }))
        .await;

        let released = results.into_iter().filter(|closed| *closed).count();
        if released > 0 {
            debug!("Released {} browser session(s)", released);
        }
    }

    /// Number of sessions currently alive. Zero after `shutdown`.
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Exclusive access to one worker's session for the duration of a task.
pub struct SessionGuard<'a, F: SessionFactory> {
    guard: MutexGuard<'a, Option<F::Session>>,
}

impl<'a, F: SessionFactory> SessionGuard<'a, F> {
    pub fn session(&mut self) -> &mut F::Session {
        self.guard
            .as_mut()
            .expect("slot filled by get_or_create")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::FakeFactory;

    #[tokio::test]
    async fn session_created_once_per_worker() {
        let factory = Arc::new(FakeFactory::succeeding());
        let pool = SessionPool::new(factory.clone(), 2);

        {
            let mut guard = pool.get_or_create(0).await.unwrap();
            guard.session().fetch("https://a.example", None).await.unwrap();
        }
        {
            let mut guard = pool.get_or_create(0).await.unwrap();
            guard.session().fetch("https://b.example", None).await.unwrap();
        }

        assert_eq!(factory.created(), 1);
        assert_eq!(pool.live_sessions(), 1);

        pool.get_or_create(1).await.unwrap();
        assert_eq!(factory.created(), 2);
        assert_eq!(pool.live_sessions(), 2);
    }

    #[tokio::test]
    async fn failed_creation_leaves_slot_empty() {
        let factory = Arc::new(FakeFactory::failing_create());
        let pool = SessionPool::new(factory.clone(), 1);

        assert!(pool.get_or_create(0).await.is_err());
        assert_eq!(pool.live_sessions(), 0);

        // The next attempt tries again rather than handing out a dead slot.
        assert!(pool.get_or_create(0).await.is_err());
    }

    #[tokio::test]
    async fn shutdown_releases_every_session_once() {
        let factory = Arc::new(FakeFactory::succeeding());
        let pool = SessionPool::new(factory.clone(), 3);

        pool.get_or_create(0).await.unwrap();
        pool.get_or_create(2).await.unwrap();
        assert_eq!(pool.live_sessions(), 2);

        pool.shutdown().await;
        assert_eq!(pool.live_sessions(), 0);
        assert_eq!(factory.closed(), 2);

        // Shutting down twice must not double-close anything.
        pool.shutdown().await;
        assert_eq!(factory.closed(), 2);
    }
}
