//! Events fanned out to real-time subscribers

use serde::{Deserialize, Serialize};

use super::{DeviceStatusEvent, GpsRecord};

/// Event emitted by the session subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FleetEvent {
    /// A location record was persisted
    Location(GpsRecord),
    /// A status record was persisted
    Status(GpsRecord),
    /// Device liveness changed or was re-derived
    DeviceStatus(DeviceStatusEvent),
}

impl FleetEvent {
    /// IMEI the event concerns
    pub fn imei(&self) -> &str {
        match self {
            FleetEvent::Location(record) | FleetEvent::Status(record) => &record.imei,
            FleetEvent::DeviceStatus(event) => &event.imei,
        }
    }

    /// Short event name, used as the SSE event type
    pub fn kind(&self) -> &'static str {
        match self {
            FleetEvent::Location(_) => "location",
            FleetEvent::Status(_) => "status",
            FleetEvent::DeviceStatus(_) => "device_status",
        }
    }
}
