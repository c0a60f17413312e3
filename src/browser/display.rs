use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::ScrapeError;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READY_POLL_ATTEMPTS: u32 = 50;

/// An Xvfb virtual display owned by one browser session.
///
/// Firefox needs a real X display even when nobody is watching; each worker
/// gets its own display number so sessions never share a server. The display
/// must outlive its browser session and be stopped right after it.
pub struct VirtualDisplay {
    number: u32,
    child: Option<Child>,
}

impl VirtualDisplay {
    /// Spawn an Xvfb server on `:number` and wait until it accepts clients.
    pub async fn start(number: u32, width: u32, height: u32) -> Result<Self, ScrapeError> {
        let child = Command::new("Xvfb")
            .arg(format!(":{number}"))
            .args(["-screen", "0"])
            .arg(format!("{width}x{height}x24"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ScrapeError::SessionStart(format!("failed to spawn Xvfb on :{number}: {e}"))
            })?;

        let mut display = Self {
            number,
            child: Some(child),
        };

        if let Err(e) = display.wait_ready().await {
            display.stop().await;
            return Err(e);
        }

        debug!("Virtual display :{} is up", number);
        Ok(display)
    }

    /// The DISPLAY value browser processes should be started with.
    pub fn name(&self) -> String {
        format!(":{}", self.number)
    }

    /// Xvfb creates its listening socket once the server is ready.
    async fn wait_ready(&mut self) -> Result<(), ScrapeError> {
        let socket = format!("/tmp/.X11-unix/X{}", self.number);

        for _ in 0..READY_POLL_ATTEMPTS {
            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    return Err(ScrapeError::SessionStart(format!(
                        "Xvfb on :{} exited during startup: {status}",
                        self.number
                    )));
                }
            }
            if Path::new(&socket).exists() {
                return Ok(());
            }
            sleep(READY_POLL_INTERVAL).await;
        }

        Err(ScrapeError::SessionStart(format!(
            "Xvfb on :{} did not become ready",
            self.number
        )))
    }

    /// Kill the Xvfb process. Safe to call more than once.
    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill Xvfb on :{}: {}", self.number, e);
            }
            let _ = child.wait().await;
            debug!("Virtual display :{} stopped", self.number);
        }
    }
}
