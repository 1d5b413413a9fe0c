//! Server configuration
//!
//! Loaded from a TOML file; every section and field is optional and falls
//! back to the defaults below.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:5023"
//!
//! [pipeline.bounds]
//! min_lat = 26.3
//! max_lat = 30.5
//! min_lon = 80.0
//! max_lon = 88.3
//!
//! [control]
//! checksum = "crc-itu"
//!
//! [[devices]]
//! imei = "358899051234567"
//! name = "Truck 7"
//! overspeed_limit = 80
//! ```

use std::path::Path;

use fleet_core::Vehicle;
use gt06_codec::CommandChecksum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Complete server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ListenerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    /// Devices seeded into the in-memory registry
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weight = self.pipeline.smoothing_weight;
        if !(0.0..=1.0).contains(&weight) {
            return Err(ConfigError::Invalid {
                field: "pipeline.smoothing_weight",
                reason: format!("{} is outside [0, 1]", weight),
            });
        }
        let b = &self.pipeline.bounds;
        if b.min_lat > b.max_lat || b.min_lon > b.max_lon {
            return Err(ConfigError::Invalid {
                field: "pipeline.bounds",
                reason: "minimum exceeds maximum".to_string(),
            });
        }
        if self.monitor.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "monitor.interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.alerts.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "alerts.cleanup_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Vehicles declared in `[[devices]]`
    pub fn vehicles(&self) -> Vec<Vehicle> {
        self.devices
            .iter()
            .map(|d| Vehicle::new(&d.imei, &d.name, d.overspeed_limit))
            .collect()
    }
}

// =============================================================================
// Listener
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Address devices connect to
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:5023".to_string()
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds a new connection has to log in
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
    /// Seconds of silence before an authenticated connection is closed (0 disables)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_login_timeout() -> u64 {
    60
}

fn default_idle_timeout() -> u64 {
    900
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_timeout_secs: default_login_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

// =============================================================================
// GPS pipeline
// =============================================================================

/// Accepted coordinate area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min_lat: -90.0,
            max_lat: 90.0,
            min_lon: -180.0,
            max_lon: 180.0,
        }
    }
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }

    /// True when the box spans every valid coordinate and so filters nothing
    pub fn is_global(&self) -> bool {
        self.min_lat <= -90.0 && self.max_lat >= 90.0 && self.min_lon <= -180.0 && self.max_lon >= 180.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub bounds: BoundingBox,
    #[serde(default = "default_min_satellites")]
    pub min_satellites: u8,
    /// Lower bar applied when the device reports a positioned fix
    #[serde(default = "default_min_satellites")]
    pub relaxed_min_satellites: u8,
    /// Points closer than this to the last stored point are duplicates (m)
    #[serde(default = "default_duplicate_distance")]
    pub duplicate_distance_m: f64,
    /// Points further than this from the last stored point are erratic (m)
    #[serde(default = "default_max_jump")]
    pub max_jump_m: f64,
    /// Direction reversals sharper than this are zig-zag noise (degrees)
    #[serde(default = "default_max_turn_angle")]
    pub max_turn_angle_deg: f64,
    /// Weight of the new point when smoothing
    #[serde(default = "default_smoothing_weight")]
    pub smoothing_weight: f64,
    /// Status frames repeating the stored ignition state within this window are dropped
    #[serde(default = "default_status_suppress")]
    pub status_suppress_secs: u64,
}

fn default_min_satellites() -> u8 {
    3
}

fn default_duplicate_distance() -> f64 {
    5.0
}

fn default_max_jump() -> f64 {
    1000.0
}

fn default_max_turn_angle() -> f64 {
    150.0
}

fn default_smoothing_weight() -> f64 {
    0.7
}

fn default_status_suppress() -> u64 {
    60
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bounds: BoundingBox::default(),
            min_satellites: default_min_satellites(),
            relaxed_min_satellites: default_min_satellites(),
            duplicate_distance_m: default_duplicate_distance(),
            max_jump_m: default_max_jump(),
            max_turn_angle_deg: default_max_turn_angle(),
            smoothing_weight: default_smoothing_weight(),
            status_suppress_secs: default_status_suppress(),
        }
    }
}

// =============================================================================
// Timeout monitor
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
    /// Devices whose latest record is older than this are inactive
    #[serde(default = "default_inactive_after")]
    pub inactive_after_secs: u64,
    /// Speed above which a vehicle counts as running (km/h)
    #[serde(default = "default_running_speed")]
    pub running_speed_kmh: f64,
}

fn default_monitor_interval() -> u64 {
    300
}

fn default_inactive_after() -> u64 {
    3600
}

fn default_running_speed() -> f64 {
    5.0
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval(),
            inactive_after_secs: default_inactive_after(),
            running_speed_kmh: default_running_speed(),
        }
    }
}

// =============================================================================
// Control
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_secs: u64,
    #[serde(default)]
    pub checksum: CommandChecksum,
}

fn default_reply_timeout() -> u64 {
    10
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            reply_timeout_secs: default_reply_timeout(),
            checksum: CommandChecksum::default(),
        }
    }
}

// =============================================================================
// Alerts
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Repeats of the same alert for a device are suppressed for this long
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_cooldown() -> u64 {
    300
}

fn default_cleanup_interval() -> u64 {
    600
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

// =============================================================================
// Devices
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub imei: String,
    pub name: String,
    #[serde(default = "default_overspeed_limit")]
    pub overspeed_limit: f64,
}

fn default_overspeed_limit() -> f64 {
    80.0
}
