//! Derived device liveness state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::GpsRecord;

/// Liveness state published for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Device authenticated on a new connection
    Connected,
    /// Device connection closed
    Disconnected,
    /// No record was ever stored for the device
    NoData,
    /// Latest record is older than the inactivity threshold
    Inactive,
    /// Moving faster than the vehicle's limit
    Overspeed,
    /// Moving
    Running,
    /// Stationary with ignition on
    Idle,
    /// Stationary with ignition off
    Stopped,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Connected => "connected",
            DeviceState::Disconnected => "disconnected",
            DeviceState::NoData => "no_data",
            DeviceState::Inactive => "inactive",
            DeviceState::Overspeed => "overspeed",
            DeviceState::Running => "running",
            DeviceState::Idle => "idle",
            DeviceState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device status change as published to dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatusEvent {
    pub imei: String,
    pub state: DeviceState,
    pub at: DateTime<Utc>,
    /// Last known record, when the state was derived from one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_record: Option<GpsRecord>,
}

impl DeviceStatusEvent {
    pub fn new(imei: impl Into<String>, state: DeviceState) -> Self {
        Self {
            imei: imei.into(),
            state,
            at: Utc::now(),
            last_record: None,
        }
    }

    pub fn with_record(mut self, record: GpsRecord) -> Self {
        self.last_record = Some(record);
        self
    }
}
