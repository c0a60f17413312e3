use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ScrapeError;

const CHECK_URL: &str = "https://check.torproject.org/api/ip";
const CIRCUIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Answer from the Tor project's exit check.
#[derive(Debug, Serialize, Deserialize)]
pub struct TorCheck {
    #[serde(rename = "IsTor")]
    pub is_tor: bool,
    #[serde(rename = "IP")]
    pub ip: String,
}

/// Cheap reachability probe of the SOCKS endpoint.
///
/// Run before a scraping round so a stopped Tor daemon fails fast instead
/// of burning a full round of browser-session failures.
pub async fn probe_endpoint(host: &str, port: u16, wait: Duration) -> Result<(), ScrapeError> {
    let addr = format!("{host}:{port}");
    match timeout(wait, TcpStream::connect(&addr)).await {
        Ok(Ok(_)) => {
            debug!("SOCKS endpoint {} is reachable", addr);
            Ok(())
        }
        Ok(Err(e)) => Err(ScrapeError::ProxyUnreachable {
            host: host.to_string(),
            port,
            message: e.to_string(),
        }),
        Err(_) => Err(ScrapeError::ProxyUnreachable {
            host: host.to_string(),
            port,
            message: format!("connect timed out after {}s", wait.as_secs()),
        }),
    }
}

/// Confirm the circuit end to end by asking check.torproject.org through
/// the proxy whether our exit is a Tor exit.
pub async fn check_circuit(host: &str, port: u16) -> Result<TorCheck, ScrapeError> {
    let unreachable = |message: String| ScrapeError::ProxyUnreachable {
        host: host.to_string(),
        port,
        message,
    };

    let proxy = reqwest::Proxy::all(format!("socks5h://{host}:{port}"))
        .map_err(|e| unreachable(format!("invalid proxy URL: {e}")))?;
    let client = reqwest::Client::builder()
        .proxy(proxy)
        .timeout(CIRCUIT_TIMEOUT)
        .build()
        .map_err(|e| unreachable(format!("failed to build HTTP client: {e}")))?;

    let check = client
        .get(CHECK_URL)
        .send()
        .await
        .map_err(|e| unreachable(format!("request through proxy failed: {e}")))?
        .json::<TorCheck>()
        .await
        .map_err(|e| unreachable(format!("unexpected check response: {e}")))?;

    debug!("Circuit check: is_tor={} ip={}", check.is_tor, check.ip);
    Ok(check)
}
