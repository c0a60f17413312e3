use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thirtyfour::common::capabilities::firefox::{FirefoxCapabilities, FirefoxPreferences};
use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::browser::display::VirtualDisplay;
use crate::browser::{PageSession, SessionFactory};
use crate::error::ScrapeError;

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(250);
const CONNECT_RETRY_ATTEMPTS: u32 = 20;

/// Everything needed to start one browser session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub proxy_host: String,
    pub proxy_port: u16,
    pub user_agent: String,
    pub page_load_timeout: Duration,
    pub script_timeout: Duration,
    pub driver_path: PathBuf,
    pub driver_base_port: u16,
    pub download_dir: PathBuf,
    pub display_width: u32,
    pub display_height: u32,
    pub display_base: u32,
}

/// One Firefox session routed over the SOCKS proxy, plus the geckodriver
/// process serving it and the virtual display it renders on.
///
/// All three are torn down together by `close`: a session without its
/// display, or a display outliving its session, is a process leak.
pub struct Session {
    id: Uuid,
    driver: Option<WebDriver>,
    driver_proc: Option<Child>,
    display: VirtualDisplay,
}

impl Session {
    /// Start the display, geckodriver and browser for one worker.
    ///
    /// Worker ids map to distinct display numbers and driver ports so that
    /// concurrent sessions never collide. Start failures are not retried
    /// here; they surface on the caller's task-failure path.
    pub async fn start(config: &SessionConfig, worker_id: usize) -> Result<Self, ScrapeError> {
        let id = Uuid::new_v4();

        let mut display = VirtualDisplay::start(
            config.display_base + worker_id as u32,
            config.display_width,
            config.display_height,
        )
        .await?;

        let port = config.driver_base_port + worker_id as u16;
        let mut driver_proc = match Self::spawn_driver(config, &display, port) {
            Ok(child) => child,
            Err(e) => {
                display.stop().await;
                return Err(e);
            }
        };

        let driver = match Self::connect(config, port).await {
            Ok(driver) => driver,
            Err(e) => {
                let _ = driver_proc.start_kill();
                let _ = driver_proc.wait().await;
                display.stop().await;
                return Err(e);
            }
        };

        info!("Created session {} for worker {}", id, worker_id);
        Ok(Self {
            id,
            driver: Some(driver),
            driver_proc: Some(driver_proc),
            display,
        })
    }

    fn spawn_driver(
        config: &SessionConfig,
        display: &VirtualDisplay,
        port: u16,
    ) -> Result<Child, ScrapeError> {
        Command::new(&config.driver_path)
            .args(["--port", &port.to_string()])
            .env("DISPLAY", display.name())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ScrapeError::SessionStart(format!(
                    "failed to spawn {}: {e}",
                    config.driver_path.display()
                ))
            })
    }

    /// geckodriver takes a moment to bind its port, so connecting retries
    /// briefly before giving up.
    async fn connect(config: &SessionConfig, port: u16) -> Result<WebDriver, ScrapeError> {
        let server = format!("http://localhost:{port}");
        let mut last_error = String::new();

        for _ in 0..CONNECT_RETRY_ATTEMPTS {
            let caps = Self::firefox_caps(config)?;
            match WebDriver::new(&server, caps).await {
                Ok(driver) => {
                    Self::apply_timeouts(&driver, config).await?;
                    return Ok(driver);
                }
                Err(e) => {
                    last_error = e.to_string();
                    sleep(CONNECT_RETRY_INTERVAL).await;
                }
            }
        }

        Err(ScrapeError::SessionStart(format!(
            "could not reach geckodriver at {server}: {last_error}"
        )))
    }

    fn firefox_caps(config: &SessionConfig) -> Result<FirefoxCapabilities, ScrapeError> {
        let mut prefs = FirefoxPreferences::new();
        let set = |prefs: &mut FirefoxPreferences,
                   key: &str,
                   value: serde_json::Value|
         -> Result<(), ScrapeError> {
            prefs
                .set(key, value)
                .map_err(|e| ScrapeError::SessionStart(format!("invalid preference {key}: {e}")))
        };

        // SOCKS proxying and identity.
        set(&mut prefs, "network.proxy.type", json!(1))?;
        set(&mut prefs, "network.proxy.socks", json!(config.proxy_host))?;
        set(&mut prefs, "network.proxy.socks_port", json!(config.proxy_port))?;
        set(
            &mut prefs,
            "general.useragent.override",
            json!(config.user_agent),
        )?;

        // Response and script budgets enforced inside the browser.
        set(
            &mut prefs,
            "http.response.timeout",
            json!(config.page_load_timeout.as_secs()),
        )?;
        set(
            &mut prefs,
            "dom.max_script_run_time",
            json!(config.script_timeout.as_secs()),
        )?;

        // Auto-save PDFs into the download directory instead of opening the
        // built-in viewer.
        set(&mut prefs, "browser.download.folderList", json!(2))?;
        set(
            &mut prefs,
            "browser.download.dir",
            json!(config.download_dir.to_string_lossy()),
        )?;
        set(
            &mut prefs,
            "browser.helperApps.neverAsk.saveToDisk",
            json!("application/pdf"),
        )?;
        set(&mut prefs, "pdfjs.disabled", json!(true))?;

        let mut caps = DesiredCapabilities::firefox();
        caps.set_preferences(prefs)
            .map_err(|e| ScrapeError::SessionStart(format!("invalid capabilities: {e}")))?;
        Ok(caps)
    }

    async fn apply_timeouts(
        driver: &WebDriver,
        config: &SessionConfig,
    ) -> Result<(), ScrapeError> {
        driver
            .set_page_load_timeout(config.page_load_timeout)
            .await
            .map_err(|e| ScrapeError::SessionStart(format!("failed to set page load timeout: {e}")))?;
        driver
            .set_script_timeout(config.script_timeout)
            .await
            .map_err(|e| ScrapeError::SessionStart(format!("failed to set script timeout: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl PageSession for Session {
    async fn fetch(&mut self, url: &str, selector: Option<&str>) -> Result<String, ScrapeError> {
        let driver = self
            .driver
            .as_ref()
            .ok_or_else(|| ScrapeError::SessionStart("session already closed".to_string()))?;

        debug!("Session {} navigating to {}", self.id, url);
        driver.goto(url).await.map_err(|e| ScrapeError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        match selector {
            None => driver.source().await.map_err(|e| ScrapeError::Navigation {
                url: url.to_string(),
                message: format!("failed to read page source: {e}"),
            }),
            Some(xpath) => match driver.find(By::XPath(xpath)).await {
                Ok(element) => {
                    element
                        .outer_html()
                        .await
                        .map_err(|e| ScrapeError::Navigation {
                            url: url.to_string(),
                            message: format!("failed to read element markup: {e}"),
                        })
                }
                Err(WebDriverError::NoSuchElement(_)) => Err(ScrapeError::ElementNotFound {
                    selector: xpath.to_string(),
                }),
                Err(e) => Err(ScrapeError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                }),
            },
        }
    }

    /// Quit the browser first, then the driver process, then the display.
    async fn close(&mut self) -> Result<(), ScrapeError> {
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.quit().await {
                warn!("Error quitting session {}: {}", self.id, e);
            }
        }
        if let Some(mut proc) = self.driver_proc.take() {
            let _ = proc.start_kill();
            let _ = proc.wait().await;
        }
        self.display.stop().await;
        info!("Session {} closed", self.id);
        Ok(())
    }
}

/// The production `SessionFactory`: one real Firefox session per worker.
pub struct BrowserSessionFactory {
    config: SessionConfig,
}

impl BrowserSessionFactory {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for BrowserSessionFactory {
    type Session = Session;

    async fn create(&self, worker_id: usize) -> Result<Session, ScrapeError> {
        Session::start(&self.config, worker_id).await
    }
}
