//! Narrow traits through which the session subsystem reaches the platform
//!
//! Implementations live outside the core (database, push backend, dashboard
//! fan-out). [`crate::memory`] holds in-process versions.

use async_trait::async_trait;

use crate::error::CollaboratorResult;
use crate::models::{DeviceStatusEvent, GpsRecord, Vehicle};

/// Source of truth for which devices may connect
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Whether a device with this IMEI is known
    async fn is_registered(&self, imei: &str) -> CollaboratorResult<bool>;

    /// Vehicle the device is installed in
    async fn vehicle_by_imei(&self, imei: &str) -> CollaboratorResult<Option<Vehicle>>;

    /// Every known vehicle
    async fn all_vehicles(&self) -> CollaboratorResult<Vec<Vehicle>>;
}

/// Append-only telemetry storage
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a validated record
    async fn insert(&self, record: GpsRecord) -> CollaboratorResult<()>;

    /// Up to `limit` most recent records for a device, newest first
    async fn most_recent_by_imei(&self, imei: &str, limit: usize) -> CollaboratorResult<Vec<GpsRecord>>;
}

/// Alert evaluation run before a record is persisted.
///
/// An error vetoes persistence of the record.
#[async_trait]
pub trait NotificationGate: Send + Sync {
    async fn check_and_notify(&self, record: &GpsRecord) -> CollaboratorResult<()>;
}

/// Real-time fan-out of session events
pub trait EventPublisher: Send + Sync {
    /// A location record was persisted
    fn publish_location(&self, record: &GpsRecord);

    /// A status record was persisted
    fn publish_status(&self, record: &GpsRecord);

    /// Device liveness changed
    fn publish_device_status(&self, imei: &str, event: DeviceStatusEvent);
}
