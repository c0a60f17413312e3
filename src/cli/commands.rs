use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::browser::BrowserSessionFactory;
use crate::cli::config::ScrapeConfig;
use crate::proxy::tor;
use crate::scraper::{ResumeTracker, WorkPool};
use crate::storage::CompletionStoreFactory;

const PROBE_WAIT: Duration = Duration::from_secs(5);

/// Run the scraper until the URL list is drained or a fatal condition stops it.
pub async fn scrape(
    mut config: ScrapeConfig,
    urls: Option<PathBuf>,
    output: Option<PathBuf>,
    threads: Option<usize>,
    fail_limit: Option<usize>,
) -> Result<()> {
    if let Some(urls) = urls {
        config.storage.urls_file = urls;
    }
    if let Some(output) = output {
        config.storage.output_dir = output;
    }
    if let Some(threads) = threads {
        config.scraper.n_threads = Some(threads);
    }
    if let Some(fail_limit) = fail_limit {
        config.scraper.fail_limit = fail_limit;
    }

    // Fail fast on a stopped Tor daemon instead of burning a round of
    // browser-session failures.
    tor::probe_endpoint(&config.proxy.host, config.proxy.port, PROBE_WAIT)
        .await
        .context("SOCKS proxy is not reachable; is the Tor daemon running?")?;

    let store = CompletionStoreFactory::create(&config.storage)
        .await
        .context("Failed to open the output store")?;

    let workers = config.worker_count();
    info!(
        "Scraping {} into {} with {} workers",
        config.storage.urls_file.display(),
        config.storage.output_dir.display(),
        workers
    );

    let factory = Arc::new(BrowserSessionFactory::new(config.session_config()));
    let pool = WorkPool::new(
        factory,
        workers,
        config.scraper.fail_limit,
        config.scraper.selector.clone(),
    );
    let tracker = ResumeTracker::new(config.storage.urls_file.clone(), store, pool);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, shutting down");
            let _ = cancel_tx.send(true);
        }
    });

    tracker
        .run(cancel_rx)
        .await
        .context("Scraping did not run to completion")?;

    info!("URL list fully scraped");
    Ok(())
}

/// Probe the SOCKS endpoint and confirm the circuit exits through Tor.
pub async fn check_tor(config: ScrapeConfig) -> Result<()> {
    let host = &config.proxy.host;
    let port = config.proxy.port;

    tor::probe_endpoint(host, port, PROBE_WAIT)
        .await
        .context("SOCKS proxy is not reachable; is the Tor daemon running?")?;
    info!("SOCKS endpoint {}:{} is reachable", host, port);

    let check = tor::check_circuit(host, port)
        .await
        .context("Circuit check through the proxy failed")?;

    println!("{}", serde_json::to_string_pretty(&check)?);

    if !check.is_tor {
        error!("Exit {} is not a Tor exit", check.ip);
        bail!("traffic through {}:{} is not routed over Tor", host, port);
    }

    info!("Traffic is routed through Tor (exit {})", check.ip);
    Ok(())
}

/// Print the active configuration; with `init`, also save it as the default.
pub fn show_config(config: ScrapeConfig, init: bool) -> Result<()> {
    if init {
        let path = config.save_as_default()?;
        info!("Configuration saved to {}", path.display());
    }

    println!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}
