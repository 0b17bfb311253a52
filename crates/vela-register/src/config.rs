//! # Register Configuration
//!
//! Configuration management for the register runtime.
//!
//! ## Configuration File Format
//! ```toml
//! # register.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Register 1"
//!
//! [server]
//! base_url = "http://192.168.1.10:8787"
//! request_timeout_secs = 30
//!
//! [sync]
//! interval_secs = 60
//! jitter_secs = 5
//! settle_delay_ms = 2000
//!
//! [probe]
//! interval_secs = 30
//! timeout_secs = 3
//! ```
//!
//! Every knob the scheduler and the connectivity monitor use is explicit
//! configuration: the polling interval, its jitter, the reconnect settle
//! delay, and the probe cadence/timeout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{RegisterError, RegisterResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this register device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable device name (e.g., "Register 1").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Register".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Server Settings
// =============================================================================

/// Where the server of record lives and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Base URL of the cloud API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for the bulk sync request. Bounded so a stalled upload is a
    /// failure retried by the next trigger, never a hang.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Scheduler behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between sync attempts while idle and online (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Jitter added to the interval (seconds) so a fleet of registers does
    /// not hammer the server in lockstep after an outage.
    #[serde(default = "default_jitter")]
    pub jitter_secs: u64,

    /// Delay between an "online" transition and the reconnect sync attempt
    /// (milliseconds), to avoid racing a flapping connection.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

fn default_interval() -> u64 {
    60
}

fn default_jitter() -> u64 {
    5
}

fn default_settle_delay() -> u64 {
    2_000
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            interval_secs: default_interval(),
            jitter_secs: default_jitter(),
            settle_delay_ms: default_settle_delay(),
        }
    }
}

impl SyncSettings {
    /// Settle delay as a Duration.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

// =============================================================================
// Probe Settings
// =============================================================================

/// Active health probe settings for the connectivity monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Interval between periodic probes (seconds).
    #[serde(default = "default_probe_interval")]
    pub interval_secs: u64,

    /// Hard timeout per probe request (seconds). OS "online" signals are
    /// unreliable indicators of actual server reachability, so a probe must
    /// answer within this window before the register is considered online.
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

fn default_probe_interval() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    3
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            interval_secs: default_probe_interval(),
            timeout_secs: default_probe_timeout(),
        }
    }
}

impl ProbeSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Register Configuration
// =============================================================================

/// Full register configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub probe: ProbeSettings,
}

impl RegisterConfig {
    /// Default config file location for this platform.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "vela", "vela-pos")
            .map(|dirs| dirs.config_dir().join("register.toml"))
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> RegisterResult<Self> {
        debug!(path = %path.display(), "Loading register config");
        let raw = std::fs::read_to_string(path)?;
        let config: RegisterConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config file if present, otherwise writes defaults to it.
    pub fn load_or_init(path: &Path) -> RegisterResult<Self> {
        if path.exists() {
            return Self::load(path);
        }

        info!(path = %path.display(), "No config found, writing defaults");
        let config = RegisterConfig::default();
        config.save(path)?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save(&self, path: &Path) -> RegisterResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> RegisterResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(RegisterError::InvalidConfig("device.id is empty".into()));
        }
        if !self.server.base_url.starts_with("http://") && !self.server.base_url.starts_with("https://")
        {
            return Err(RegisterError::InvalidConfig(format!(
                "server.base_url must be an http(s) URL, got '{}'",
                self.server.base_url
            )));
        }
        if self.probe.timeout_secs == 0 {
            return Err(RegisterError::InvalidConfig(
                "probe.timeout_secs must be at least 1".into(),
            ));
        }
        if self.sync.interval_secs == 0 {
            return Err(RegisterError::InvalidConfig(
                "sync.interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Endpoint URLs
    // =========================================================================

    fn base(&self) -> &str {
        self.server.base_url.trim_end_matches('/')
    }

    /// Bulk sync endpoint.
    pub fn sync_url(&self) -> String {
        format!("{}/api/sync/sales", self.base())
    }

    /// Health probe endpoint.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base())
    }

    /// Catalog feed endpoint.
    pub fn catalog_url(&self) -> String {
        format!("{}/api/catalog", self.base())
    }

    /// Bulk sync request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegisterConfig::default();
        assert_eq!(config.probe.interval_secs, 30);
        assert_eq!(config.probe.timeout_secs, 3);
        assert_eq!(config.sync.settle_delay_ms, 2_000);
        assert!(!config.device.id.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_urls_strip_trailing_slash() {
        let mut config = RegisterConfig::default();
        config.server.base_url = "http://pos.example.com/".into();
        assert_eq!(config.sync_url(), "http://pos.example.com/api/sync/sales");
        assert_eq!(config.health_url(), "http://pos.example.com/health");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let raw = r#"
            [device]
            id = "reg-1"
            name = "Front Counter"

            [server]
            base_url = "http://10.0.0.2:8787"
        "#;
        let config: RegisterConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.device.name, "Front Counter");
        assert_eq!(config.sync.interval_secs, 60);
        assert_eq!(config.probe.timeout_secs, 3);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = RegisterConfig::default();
        config.server.base_url = "ftp://example.com".into();
        assert!(config.validate().is_err());
    }
}
