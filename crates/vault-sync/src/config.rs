//! # Sync Configuration
//!
//! Configuration management for the replica runtime.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     VAULT_API_URL=https://vault.example.com/api/                       │
//! │     VAULT_POLL_INTERVAL_SECS=30                                        │
//! │     VAULT_CACHE_PATH=/var/lib/vault/cache.db                           │
//! │     VAULT_DISPATCH_UNCHANGED_WATERMARK=true                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/replica/sync.toml (Linux)                                │
//! │     ~/Library/Application Support/com.vault.replica/sync.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [api]
//! base_url = "https://vault.example.com/api/"
//! request_timeout_secs = 30
//! app_version = "linux-replica@0.1.0"
//!
//! [polling]
//! interval_secs = 30
//! min_interval_ms = 500
//! dispatch_unchanged_watermark = false
//!
//! [cache]
//! database_path = "/var/lib/vault/cache.db"
//! hydrate_debounce_ms = 500
//! write_throttle_ms = 2000
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

/// Lowest accepted delay between two polls of one share.
pub const MIN_POLL_FLOOR_MS: u64 = 100;

// =============================================================================
// API Settings
// =============================================================================

/// Remote API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL every endpoint path is joined onto.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound for a single request, long polls included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Sent as `x-pm-appversion`.
    #[serde(default = "default_app_version")]
    pub app_version: String,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/api/".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_app_version() -> String {
    format!("replica@{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            app_version: default_app_version(),
        }
    }
}

// =============================================================================
// Polling Settings
// =============================================================================

/// Event channel timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingSettings {
    /// Sleep between two polls of the same share.
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Sleep before the next poll when the server reports more events.
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Dispatch `ShareEvent` even when the watermark did not move.
    #[serde(default)]
    pub dispatch_unchanged_watermark: bool,

    /// First retry delay after a transient failure.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Retry delay ceiling.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_poll_interval() -> u64 {
    30
}
fn default_min_interval() -> u64 {
    500
}
fn default_initial_backoff() -> u64 {
    1_000
}
fn default_max_backoff() -> u64 {
    300
}

impl Default for PollingSettings {
    fn default() -> Self {
        PollingSettings {
            interval_secs: default_poll_interval(),
            min_interval_ms: default_min_interval(),
            dispatch_unchanged_watermark: false,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Encrypted cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// SQLite file holding the cache blob. `None` keeps the cache in memory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Quiet period before a hydration reads the cache.
    #[serde(default = "default_hydrate_debounce")]
    pub hydrate_debounce_ms: u64,

    /// Delay applied to throttled cache writes.
    #[serde(default = "default_write_throttle")]
    pub write_throttle_ms: u64,
}

fn default_hydrate_debounce() -> u64 {
    500
}
fn default_write_throttle() -> u64 {
    2_000
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            database_path: None,
            hydrate_debounce_ms: default_hydrate_debounce(),
            write_throttle_ms: default_write_throttle(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub polling: PollingSettings,

    #[serde(default)]
    pub cache: CacheSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = url::Url::parse(&self.api.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.polling.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_secs must be greater than 0".into(),
            ));
        }

        if self.polling.min_interval_ms < MIN_POLL_FLOOR_MS {
            return Err(SyncError::InvalidConfig(format!(
                "min_interval_ms must be at least {}",
                MIN_POLL_FLOOR_MS
            )));
        }

        if self.polling.min_interval_ms > self.polling.interval_secs.saturating_mul(1_000) {
            return Err(SyncError::InvalidConfig(
                "min_interval_ms cannot exceed interval_secs".into(),
            ));
        }

        if self.polling.initial_backoff_ms > self.polling.max_backoff_secs.saturating_mul(1_000) {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_ms cannot exceed max_backoff_secs".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("VAULT_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Ok(interval) = std::env::var("VAULT_POLL_INTERVAL_SECS") {
            match interval.parse::<u64>() {
                Ok(secs) => self.polling.interval_secs = secs,
                Err(_) => warn!(value = %interval, "Ignoring invalid poll interval in environment"),
            }
        }

        if let Ok(path) = std::env::var("VAULT_CACHE_PATH") {
            debug!(path = %path, "Overriding cache path from environment");
            self.cache.database_path = Some(PathBuf::from(path));
        }

        if let Ok(flag) = std::env::var("VAULT_DISPATCH_UNCHANGED_WATERMARK") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.polling.dispatch_unchanged_watermark = true,
                "0" | "false" | "no" => self.polling.dispatch_unchanged_watermark = false,
                _ => warn!(value = %flag, "Unknown watermark flag in environment"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "vault", "replica")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_secs)
    }

    /// Delay before repolling a share with pending events, never below
    /// [`MIN_POLL_FLOOR_MS`].
    pub fn min_poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.min_interval_ms.max(MIN_POLL_FLOOR_MS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn hydrate_debounce(&self) -> Duration {
        Duration::from_millis(self.cache.hydrate_debounce_ms)
    }

    pub fn write_throttle(&self) -> Duration {
        Duration::from_millis(self.cache.write_throttle_ms)
    }

    /// Transient-failure backoff for one event channel.
    pub fn backoff(&self) -> backoff::ExponentialBackoff {
        backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.polling.initial_backoff_ms))
            .with_max_interval(Duration::from_secs(self.polling.max_backoff_secs))
            .with_max_elapsed_time(None)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.min_poll_interval(), Duration::from_millis(500));
        assert!(!config.polling.dispatch_unchanged_watermark);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.api.base_url = "ws://localhost".into();
        assert!(config.validate().unwrap_err().is_config_error());

        config.api.base_url = "not a url".into();
        assert!(config.validate().is_err());

        config.api.base_url = "https://vault.example.com/api/".into();
        config.polling.interval_secs = 0;
        assert!(config.validate().is_err());

        config.polling.interval_secs = 1;
        config.polling.min_interval_ms = 5_000;
        assert!(config.validate().is_err());

        config.polling.min_interval_ms = 500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_min_interval_floor() {
        let mut config = SyncConfig::default();
        config.polling.min_interval_ms = 0;

        assert!(config.validate().unwrap_err().is_config_error());
        assert_eq!(
            config.min_poll_interval(),
            Duration::from_millis(MIN_POLL_FLOOR_MS)
        );
    }

    #[test]
    fn test_huge_intervals_do_not_overflow() {
        let mut config = SyncConfig::default();
        config.polling.interval_secs = u64::MAX;
        config.polling.max_backoff_secs = u64::MAX;
        config.polling.initial_backoff_ms = u64::MAX;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [polling]
            interval_secs = 10
            dispatch_unchanged_watermark = true
            "#,
        )
        .unwrap();

        assert_eq!(config.polling.interval_secs, 10);
        assert!(config.polling.dispatch_unchanged_watermark);
        assert_eq!(config.polling.min_interval_ms, 500);
        assert_eq!(config.cache.hydrate_debounce_ms, 500);
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[api]"));
        assert!(toml_str.contains("[polling]"));
        assert!(toml_str.contains("[cache]"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = std::env::temp_dir().join(format!("vault-sync-{}.toml", std::process::id()));
        let mut config = SyncConfig::default();
        config.polling.interval_secs = 12;
        config.save(Some(path.clone())).unwrap();

        let loaded = SyncConfig::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.polling.interval_secs, 12);

        let _ = std::fs::remove_file(path);
    }
}
