use thiserror::Error;

/// Errors produced by the scraping engine.
///
/// Per-task errors (`SessionStart`, `Navigation`, `ElementNotFound`, `Io`)
/// are recoverable: they are logged, counted against the worker's failure
/// budget, and the URL stays uncompleted so the next round retries it.
/// `Cancelled` and `NoProgress` terminate the whole run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("failed to start browser session: {0}")]
    SessionStart(String),

    #[error("navigation failed for {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("no element matched selector: {selector}")]
    ElementNotFound { selector: String },

    #[error("scrape cancelled by operator")]
    Cancelled,

    #[error("no URLs completed in a full round, {remaining} still remaining")]
    NoProgress { remaining: usize },

    #[error("proxy {host}:{port} is not reachable: {message}")]
    ProxyUnreachable {
        host: String,
        port: u16,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
