//! Job tunables and optional config file loading. Search order: ./yuque-export.toml, then
//! $XDG_CONFIG_HOME/yuque-export/config.toml (or ~/.config/yuque-export/config.toml).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_DELAY_MIN_SECS: u64 = 1;
pub const DEFAULT_DELAY_MAX_SECS: u64 = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_CONCURRENT_DOWNLOADS: u32 = 1;

/// Per-job tunables. Fixed for the lifetime of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Lower bound of the pause after each exported document, in seconds.
    pub delay_min_secs: u64,
    /// Upper bound (exclusive) of that pause. No pause when not above the minimum.
    pub delay_max_secs: u64,
    pub timeout_secs: u64,
    /// Attempts per request, counting the first one.
    pub max_retries: u32,
    /// Accepted for compatibility; documents are always exported one at a time.
    pub concurrent_downloads: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delay_min_secs: DEFAULT_DELAY_MIN_SECS,
            delay_max_secs: DEFAULT_DELAY_MAX_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            concurrent_downloads: DEFAULT_CONCURRENT_DOWNLOADS,
        }
    }
}

impl Config {
    /// A zero timeout marks a config that was never filled in: all defaults apply.
    pub fn normalized(self) -> Self {
        if self.timeout_secs == 0 {
            return Self::default();
        }
        Self {
            concurrent_downloads: self.concurrent_downloads.max(1),
            ..self
        }
    }
}

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ConfigFile {
    /// Default output directory when -o is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// Session cookie copied from a logged-in browser.
    pub cookie: Option<String>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Base URL of the content API (default https://www.yuque.com).
    pub api_base: Option<String>,
    pub delay_min_secs: Option<u64>,
    pub delay_max_secs: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Attempts per request for transient failures (default 3).
    pub max_retries: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4]). If not set, default [1, 2, 4, 8] is used.
    pub retry_backoff_secs: Option<Vec<u64>>,
    pub concurrent_downloads: Option<u32>,
}

impl ConfigFile {
    /// Overlay the keys present in the file onto `base`.
    pub fn apply(&self, base: Config) -> Config {
        Config {
            delay_min_secs: self.delay_min_secs.unwrap_or(base.delay_min_secs),
            delay_max_secs: self.delay_max_secs.unwrap_or(base.delay_max_secs),
            timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            concurrent_downloads: self
                .concurrent_downloads
                .unwrap_or(base.concurrent_downloads),
        }
    }
}

/// Search order: (1) ./yuque-export.toml, (2) $XDG_CONFIG_HOME/yuque-export/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<ConfigFile>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("yuque-export.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("yuque-export").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: ConfigFile = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}

/// Output root used when neither the command line nor the config file names one.
pub fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("Downloads").join("yuque-downloads"))
        .unwrap_or_else(|| PathBuf::from("."))
}
