//! In-memory collaborator implementations
//!
//! Used by the daemon when no external platform is wired in, and by tests
//! throughout the workspace.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::collaborators::{DeviceRegistry, EventPublisher, NotificationGate, RecordStore};
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::models::{DeviceStatusEvent, FleetEvent, GpsRecord, Vehicle};

/// Default number of records kept per device
pub const DEFAULT_RECORDS_PER_DEVICE: usize = 1000;

// =============================================================================
// Device registry
// =============================================================================

/// Device registry backed by a map of IMEI to vehicle
#[derive(Debug, Default)]
pub struct InMemoryDeviceRegistry {
    vehicles: RwLock<HashMap<String, Vehicle>>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vehicles(vehicles: impl IntoIterator<Item = Vehicle>) -> Self {
        let registry = Self::new();
        for vehicle in vehicles {
            registry.add(vehicle);
        }
        registry
    }

    /// Register or replace a vehicle
    pub fn add(&self, vehicle: Vehicle) {
        self.vehicles.write().insert(vehicle.imei.clone(), vehicle);
    }

    pub fn remove(&self, imei: &str) -> Option<Vehicle> {
        self.vehicles.write().remove(imei)
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryDeviceRegistry {
    async fn is_registered(&self, imei: &str) -> CollaboratorResult<bool> {
        Ok(self.vehicles.read().contains_key(imei))
    }

    async fn vehicle_by_imei(&self, imei: &str) -> CollaboratorResult<Option<Vehicle>> {
        Ok(self.vehicles.read().get(imei).cloned())
    }

    async fn all_vehicles(&self) -> CollaboratorResult<Vec<Vehicle>> {
        let mut vehicles: Vec<Vehicle> = self.vehicles.read().values().cloned().collect();
        vehicles.sort_by(|a, b| a.imei.cmp(&b.imei));
        Ok(vehicles)
    }
}

// =============================================================================
// Record store
// =============================================================================

/// Record store keeping a bounded history per device
#[derive(Debug)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, VecDeque<GpsRecord>>>,
    per_device: usize,
    fail_inserts: AtomicBool,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new(DEFAULT_RECORDS_PER_DEVICE)
    }
}

impl InMemoryRecordStore {
    /// Create a store keeping at most `per_device` records per IMEI
    pub fn new(per_device: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            per_device: per_device.max(1),
            fail_inserts: AtomicBool::new(false),
        }
    }

    /// Make subsequent inserts fail (for exercising error paths)
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// All stored records for a device, oldest first
    pub fn records_for(&self, imei: &str) -> Vec<GpsRecord> {
        self.records
            .read()
            .get(imei)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Total record count across devices
    pub fn len(&self) -> usize {
        self.records.read().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, record: GpsRecord) -> CollaboratorResult<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Storage("insert rejected".to_string()));
        }

        let mut records = self.records.write();
        let history = records.entry(record.imei.clone()).or_default();
        history.push_back(record);
        while history.len() > self.per_device {
            history.pop_front();
        }
        Ok(())
    }

    async fn most_recent_by_imei(&self, imei: &str, limit: usize) -> CollaboratorResult<Vec<GpsRecord>> {
        let records = self.records.read();
        Ok(records
            .get(imei)
            .map(|history| history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

// =============================================================================
// Notification gate
// =============================================================================

/// Gate that either passes or refuses every record
#[derive(Debug, Default)]
pub struct StaticGate {
    refuse: AtomicBool,
}

impl StaticGate {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn refuse() -> Self {
        Self {
            refuse: AtomicBool::new(true),
        }
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationGate for StaticGate {
    async fn check_and_notify(&self, record: &GpsRecord) -> CollaboratorResult<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Notification(format!(
                "notification refused for {}",
                record.imei
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Event publisher
// =============================================================================

/// Publisher that records every event it receives
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<FleetEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of published events in order
    pub fn events(&self) -> Vec<FleetEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish_location(&self, record: &GpsRecord) {
        self.events.lock().push(FleetEvent::Location(record.clone()));
    }

    fn publish_status(&self, record: &GpsRecord) {
        self.events.lock().push(FleetEvent::Status(record.clone()));
    }

    fn publish_device_status(&self, imei: &str, event: DeviceStatusEvent) {
        debug!(imei = %imei, state = %event.state, "Recorded device status");
        self.events.lock().push(FleetEvent::DeviceStatus(event));
    }
}
