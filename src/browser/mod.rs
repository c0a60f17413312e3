pub mod display;
pub mod session;

use async_trait::async_trait;

use crate::error::ScrapeError;

// Re-export common types
pub use display::VirtualDisplay;
pub use session::{BrowserSessionFactory, Session, SessionConfig};

/// One live browser session, owned by exactly one worker.
///
/// `fetch` navigates to a URL and returns either the full page source or the
/// outer HTML of the first element matching the given relative XPath.
/// `close` releases the session and everything it spawned; it must be safe
/// to call even if the session is already gone.
#[async_trait]
pub trait PageSession: Send {
    async fn fetch(&mut self, url: &str, selector: Option<&str>) -> Result<String, ScrapeError>;

    async fn close(&mut self) -> Result<(), ScrapeError>;
}

/// Creates sessions on demand for the worker pool. Implementations must be
/// shareable across workers, but each created session belongs to the single
/// worker it was created for.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: PageSession + 'static;

    async fn create(&self, worker_id: usize) -> Result<Self::Session, ScrapeError>;
}
