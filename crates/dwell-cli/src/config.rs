//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use dwell_core::BufferLimits;
use dwell_core::buffer::{DEFAULT_BATCH_THRESHOLD, DEFAULT_MAX_PENDING};
use dwell_core::tracker::DEFAULT_MIN_SECONDS_TO_LOG;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the local state database.
    pub database_path: PathBuf,
    /// Base URL of the remote collector.
    pub collector_url: String,
    /// Seconds between scheduled flushes.
    pub flush_interval_secs: u64,
    /// Sessions shorter than this are not recorded.
    pub min_seconds_to_log: u64,
    /// Buffer length that triggers an immediate flush.
    pub batch_threshold: usize,
    /// Cap on buffered intervals (oldest dropped first). `0` means unbounded.
    pub max_pending: usize,
    /// Timeout for collector requests, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("dwell.db"),
            collector_url: "http://localhost:5000".to_string(),
            flush_interval_secs: 30,
            min_seconds_to_log: DEFAULT_MIN_SECONDS_TO_LOG,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            max_pending: DEFAULT_MAX_PENDING,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Loads configuration: defaults, the user config file, an explicit
    /// file if given, then `DWELL_*` environment variables.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (DWELL_*)
        figment = figment.merge(Env::prefixed("DWELL_"));

        figment.extract()
    }

    pub fn buffer_limits(&self) -> BufferLimits {
        BufferLimits {
            batch_threshold: self.batch_threshold,
            max_pending: (self.max_pending > 0).then_some(self.max_pending),
        }
    }

    /// Flush period; never zero.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Returns the platform-specific config directory for dwell.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("dwell"))
}

/// Returns the platform-specific data directory for dwell.
///
/// On Linux: `~/.local/share/dwell`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("dwell"))
}
