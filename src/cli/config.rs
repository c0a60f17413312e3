use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::browser::SessionConfig;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ScrapeConfig {
    pub scraper: ScraperSettings,
    pub browser: BrowserSettings,
    pub proxy: ProxySettings,
    pub storage: StorageSettings,
}

/// Scraping engine settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ScraperSettings {
    /// Worker count; unset means one worker per logical core
    pub n_threads: Option<usize>,

    /// Cumulative failures a worker tolerates before retiring itself
    pub fail_limit: usize,

    /// Relative XPath restricting the saved fragment; unset saves the whole document
    pub selector: Option<String>,
}

/// Browser session settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserSettings {
    /// Platform profile selecting user-agent and driver defaults
    pub platform_profile: PlatformProfile,

    /// User-agent override; unset uses the profile default
    pub user_agent: Option<String>,

    /// geckodriver executable; unset uses the profile default
    pub driver_path: Option<PathBuf>,

    /// First geckodriver port; worker N listens on base + N
    pub driver_base_port: u16,

    /// Page load timeout in seconds
    pub page_load_timeout: u64,

    /// Script run-time budget in seconds
    pub script_timeout: u64,

    pub display: DisplaySettings,
}

/// Virtual display settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DisplaySettings {
    pub width: u32,
    pub height: u32,

    /// First Xvfb display number; worker N renders on base + N
    pub base_number: u32,
}

/// SOCKS proxy endpoint; the Tor daemon is assumed to already be running there
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
}

/// Input, output and resumability settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    /// URL list, one URL per line
    pub urls_file: PathBuf,

    /// Directory receiving one `<url_id>.html` per fetched page
    pub output_dir: PathBuf,

    /// Which completion state drives resumability
    pub resume: ResumeStrategy,

    /// Record file for the record-file strategy; defaults to
    /// `<output_dir>/completed_urls.txt`
    pub completed_urls_file: Option<PathBuf>,

    /// Browser download directory; defaults to the output directory
    pub download_dir: Option<PathBuf>,
}

impl StorageSettings {
    pub fn completed_urls_path(&self) -> PathBuf {
        self.completed_urls_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("completed_urls.txt"))
    }

    pub fn download_path(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.clone())
    }
}

/// How completed URLs are tracked across runs.
///
/// Exactly one strategy is active per deployment; mixing them can under- or
/// over-count completed URLs when output files are partially written.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResumeStrategy {
    /// A URL is completed when its output file exists
    #[default]
    Directory,
    /// A URL is completed when it appears in the append-only record file
    RecordFile,
}

/// Platform-specific defaults for the browser session
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlatformProfile {
    #[default]
    Desktop,
    Rpi5,
}

impl PlatformProfile {
    pub fn default_user_agent(&self) -> &'static str {
        match self {
            PlatformProfile::Rpi5 => {
                "Mozilla/5.0 (X11; Linux aarch64; rv:90.0) Gecko/20100101 Firefox/90.0"
            }
            PlatformProfile::Desktop => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                 AppleWebKit/537.36 (KHTML, like Gecko) \
                 Chrome/42.0.2311.135 Safari/537.36 Edge/12.246"
            }
        }
    }

    pub fn default_driver_path(&self) -> PathBuf {
        match self {
            PlatformProfile::Rpi5 => PathBuf::from("/usr/local/bin/geckodriver"),
            PlatformProfile::Desktop => PathBuf::from("geckodriver"),
        }
    }
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            n_threads: None,
            fail_limit: 20,
            selector: None,
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            platform_profile: PlatformProfile::Desktop,
            user_agent: None,
            driver_path: None,
            driver_base_port: 4444,
            page_load_timeout: 30,
            script_timeout: 30,
            display: DisplaySettings::default(),
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 1024,
            base_number: 99,
        }
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9050,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            urls_file: PathBuf::from("urls.txt"),
            output_dir: PathBuf::from("html_files"),
            resume: ResumeStrategy::Directory,
            completed_urls_file: None,
            download_dir: None,
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperSettings::default(),
            browser: BrowserSettings::default(),
            proxy: ProxySettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl ScrapeConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        let path = if let Some(proj_dirs) = directories::ProjectDirs::from("com", "snatch", "snatch")
        {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        };

        if !path.exists() {
            if let Err(e) = fs::create_dir_all(&path) {
                error!("Failed to create config directory: {}", e);
            }
        }

        path
    }

    /// Load the default configuration
    pub fn load_default() -> Result<Self> {
        let config_path = Self::config_dir().join("default.yaml");

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("Default configuration not found. Using built-in defaults.");
            Ok(Self::default())
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save the configuration as the default
    pub fn save_as_default(&self) -> Result<PathBuf> {
        let config_path = Self::config_dir().join("default.yaml");
        self.save_to_file(&config_path)?;
        Ok(config_path)
    }

    /// Save the configuration to a file
    fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents =
            serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// The session configuration with all profile defaults resolved.
    pub fn session_config(&self) -> SessionConfig {
        let profile = self.browser.platform_profile;
        let user_agent = self.browser.user_agent.clone().unwrap_or_else(|| {
            let ua = profile.default_user_agent();
            info!("No user agent provided. Using default: {}", ua);
            ua.to_string()
        });
        let driver_path = self
            .browser
            .driver_path
            .clone()
            .unwrap_or_else(|| profile.default_driver_path());

        SessionConfig {
            proxy_host: self.proxy.host.clone(),
            proxy_port: self.proxy.port,
            user_agent,
            page_load_timeout: Duration::from_secs(self.browser.page_load_timeout),
            script_timeout: Duration::from_secs(self.browser.script_timeout),
            driver_path,
            driver_base_port: self.browser.driver_base_port,
            download_dir: self.storage.download_path(),
            display_width: self.browser.display.width,
            display_height: self.browser.display.height,
            display_base: self.browser.display.base_number,
        }
    }

    /// Worker count, defaulting to one per logical core.
    pub fn worker_count(&self) -> usize {
        self.scraper.n_threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_expectations() {
        let config = ScrapeConfig::default();
        assert_eq!(config.scraper.fail_limit, 20);
        assert_eq!(config.proxy.host, "127.0.0.1");
        assert_eq!(config.proxy.port, 9050);
        assert_eq!(config.storage.resume, ResumeStrategy::Directory);
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn yaml_round_trip() {
        let mut config = ScrapeConfig::default();
        config.scraper.n_threads = Some(4);
        config.scraper.selector = Some("//body".to_string());
        config.storage.resume = ResumeStrategy::RecordFile;
        config.browser.platform_profile = PlatformProfile::Rpi5;

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: ScrapeConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.scraper.n_threads, Some(4));
        assert_eq!(parsed.scraper.selector.as_deref(), Some("//body"));
        assert_eq!(parsed.storage.resume, ResumeStrategy::RecordFile);
        assert_eq!(parsed.browser.platform_profile, PlatformProfile::Rpi5);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = "scraper:\n  fail_limit: 3\nproxy:\n  port: 9150\n";
        let config: ScrapeConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.scraper.fail_limit, 3);
        assert_eq!(config.proxy.port, 9150);
        assert_eq!(config.proxy.host, "127.0.0.1");
        assert_eq!(config.browser.page_load_timeout, 30);
    }

    #[test]
    fn record_path_defaults_under_output_dir() {
        let config = ScrapeConfig::default();
        assert_eq!(
            config.storage.completed_urls_path(),
            config.storage.output_dir.join("completed_urls.txt")
        );

        let mut config = ScrapeConfig::default();
        config.storage.completed_urls_file = Some(PathBuf::from("/tmp/done.txt"));
        assert_eq!(
            config.storage.completed_urls_path(),
            PathBuf::from("/tmp/done.txt")
        );
    }

    #[test]
    fn session_config_resolves_profile_defaults() {
        let mut config = ScrapeConfig::default();
        config.browser.platform_profile = PlatformProfile::Rpi5;

        let session = config.session_config();
        assert!(session.user_agent.contains("aarch64"));
        assert_eq!(
            session.driver_path,
            PathBuf::from("/usr/local/bin/geckodriver")
        );

        config.browser.user_agent = Some("custom-agent".to_string());
        assert_eq!(config.session_config().user_agent, "custom-agent");
    }
}
