//! Configuration management for expocrawl using the prefer crate.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::DEFAULT_MISSING_VALUE;
use crate::sites::SiteDescriptor;

/// Records accumulated between two checkpoint rewrites when nothing else is configured.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 25;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
}

/// Browser engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserEngineConfig {
    /// Browser engine type.
    #[serde(default)]
    pub engine: BrowserEngineType,

    /// Run in headless mode (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Navigation timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Additional Chrome arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to an existing browser instead of launching one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

fn default_headless() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngineType::default(),
            headless: default_headless(),
            proxy: None,
            timeout: default_timeout(),
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}

impl BrowserEngineConfig {
    /// Apply `BROWSER_URL` from the environment, if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = std::env::var("BROWSER_URL").ok().filter(|s| !s.is_empty()) {
            tracing::debug!("Using BROWSER_URL from environment: {}", url);
            self.remote_url = Some(url);
        }
        self
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Browser engine types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BrowserEngineType {
    /// Chromium with stealth patches applied after each navigation (default).
    #[default]
    Stealth,

    /// No stealth patches (for debugging).
    Standard,
}

/// Bounded waits used by the walker and the enricher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// How long the first listing page may take to show items.
    pub load_timeout: Duration,
    /// How long to wait for new content after advancing a page.
    pub change_timeout: Duration,
    /// How long to wait for a detail page's content anchor.
    pub detail_timeout: Duration,
    /// Pause before the single detail retry.
    pub detail_retry_delay: Duration,
    /// Interval between condition checks.
    pub poll_interval: Duration,
    /// How long one scroll attempt waits for the item count to grow.
    pub scroll_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(30),
            change_timeout: Duration::from_secs(10),
            detail_timeout: Duration::from_secs(10),
            detail_retry_delay: Duration::from_secs(2),
            poll_interval: Duration::from_millis(250),
            scroll_delay: Duration::from_millis(2000),
        }
    }
}

impl Timing {
    /// Return a copy with any set override fields applied.
    pub fn with_overrides(&self, overrides: &TimingOverrides) -> Self {
        let ms = Duration::from_millis;
        Self {
            load_timeout: overrides.load_timeout_ms.map(ms).unwrap_or(self.load_timeout),
            change_timeout: overrides
                .change_timeout_ms
                .map(ms)
                .unwrap_or(self.change_timeout),
            detail_timeout: overrides
                .detail_timeout_ms
                .map(ms)
                .unwrap_or(self.detail_timeout),
            detail_retry_delay: overrides
                .detail_retry_delay_ms
                .map(ms)
                .unwrap_or(self.detail_retry_delay),
            poll_interval: overrides
                .poll_interval_ms
                .map(ms)
                .unwrap_or(self.poll_interval),
            scroll_delay: overrides.scroll_delay_ms.map(ms).unwrap_or(self.scroll_delay),
        }
    }
}

/// Optional timing overrides, in milliseconds, as written in config files
/// and site descriptors.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_retry_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_delay_ms: Option<u64>,
}

impl TimingOverrides {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory output files are written to.
    pub output_dir: PathBuf,
    /// Value written for fields that could not be extracted.
    pub missing_value: String,
    /// Records between checkpoint rewrites.
    pub checkpoint_interval: usize,
    /// User agent setting (None, "impersonate", or a custom string).
    pub user_agent: Option<String>,
    /// Delay between HTTP requests in milliseconds.
    pub request_delay_ms: u64,
    /// Wait bounds.
    pub timing: Timing,
    /// Browser engine settings.
    pub browser: BrowserEngineConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            missing_value: DEFAULT_MISSING_VALUE.to_string(),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            user_agent: None,
            request_delay_ms: 500,
            timing: Timing::default(),
            browser: BrowserEngineConfig::default(),
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Output directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Missing-value sentinel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_value: Option<String>,
    /// Records between checkpoint rewrites.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_interval: Option<usize>,
    /// User agent string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Delay between HTTP requests in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    /// Global timing overrides.
    #[serde(default, skip_serializing_if = "TimingOverrides::is_default")]
    pub timing: TimingOverrides,
    /// Browser engine settings.
    #[serde(default, skip_serializing_if = "BrowserEngineConfig::is_default")]
    pub browser: BrowserEngineConfig,
    /// Site descriptors that add to or replace the built-in ones.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sites: BTreeMap<String, SiteDescriptor>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers expocrawl config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("expocrawl").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("{}", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// TOML and YAML are chosen by extension; anything else is read as JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_err = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_err("TOML", e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_err("YAML", e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_err("JSON", e.to_string()))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref output_dir) = self.output_dir {
            settings.output_dir = self.resolve_path(output_dir, base_dir);
        }
        if let Some(ref missing) = self.missing_value {
            settings.missing_value = missing.clone();
        }
        if let Some(interval) = self.checkpoint_interval {
            settings.checkpoint_interval = interval.max(1);
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        settings.timing = settings.timing.with_overrides(&self.timing);
        settings.browser = self.browser.clone();
    }
}

/// Options for loading configuration.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), ConfigError> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    config.apply_to_settings(&mut settings, &base_dir);
    settings.browser = settings.browser.with_env_overrides();

    // EXPOCRAWL_OUTPUT_DIR takes precedence over the config file
    if let Some(dir) = std::env::var("EXPOCRAWL_OUTPUT_DIR")
        .ok()
        .filter(|s| !s.is_empty())
    {
        tracing::debug!("Using EXPOCRAWL_OUTPUT_DIR from environment: {}", dir);
        settings.output_dir = config.resolve_path(&dir, &base_dir);
    }

    Ok((settings, config))
}
