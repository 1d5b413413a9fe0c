//! Periodic device liveness sweep

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_core::{DeviceRegistry, DeviceState, DeviceStatusEvent, EventPublisher, GpsRecord, RecordStore, Vehicle};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;

/// Derives and publishes the state of every known device
pub struct TimeoutMonitor {
    devices: Arc<dyn DeviceRegistry>,
    records: Arc<dyn RecordStore>,
    publisher: Arc<dyn EventPublisher>,
    config: MonitorConfig,
}

impl TimeoutMonitor {
    pub fn new(
        devices: Arc<dyn DeviceRegistry>,
        records: Arc<dyn RecordStore>,
        publisher: Arc<dyn EventPublisher>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            devices,
            records,
            publisher,
            config,
        }
    }

    /// Run sweeps on the configured interval until the task is aborted
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = self.config.interval_secs, "Timeout monitor started");
            loop {
                interval.tick().await;
                let events = self.sweep_once().await;
                debug!(devices = events.len(), "Timeout sweep complete");
            }
        })
    }

    /// Classify and publish every known device once
    pub async fn sweep_once(&self) -> Vec<DeviceStatusEvent> {
        let vehicles = match self.devices.all_vehicles().await {
            Ok(vehicles) => vehicles,
            Err(e) => {
                error!(error = %e, "Failed to list devices for timeout sweep");
                return Vec::new();
            }
        };

        let now = Utc::now();
        let mut events = Vec::with_capacity(vehicles.len());
        for vehicle in vehicles {
            let latest = match self.records.most_recent_by_imei(&vehicle.imei, 1).await {
                Ok(mut records) => records.pop(),
                Err(e) => {
                    warn!(imei = %vehicle.imei, error = %e, "Failed to load latest record");
                    continue;
                }
            };

            let state = self.classify(&vehicle, latest.as_ref(), now);
            let mut event = DeviceStatusEvent::new(&vehicle.imei, state);
            event.at = now;
            if let Some(record) = latest {
                event = event.with_record(record);
            }

            self.publisher.publish_device_status(&vehicle.imei, event.clone());
            events.push(event);
        }
        events
    }

    /// State of a device given its latest record
    pub fn classify(&self, vehicle: &Vehicle, latest: Option<&GpsRecord>, now: DateTime<Utc>) -> DeviceState {
        let Some(record) = latest else {
            return DeviceState::NoData;
        };
        if record.age(now).num_seconds() > self.config.inactive_after_secs as i64 {
            return DeviceState::Inactive;
        }

        let speed = record.speed.unwrap_or(0.0);
        if speed > vehicle.overspeed_limit {
            DeviceState::Overspeed
        } else if speed > self.config.running_speed_kmh {
            DeviceState::Running
        } else if record.status.ignition == Some(true) {
            DeviceState::Idle
        } else {
            DeviceState::Stopped
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use fleet_core::memory::{InMemoryDeviceRegistry, InMemoryRecordStore, RecordingPublisher};
    use fleet_core::FleetEvent;
    use pretty_assertions::assert_eq;

    use super::*;

    struct Fixture {
        monitor: TimeoutMonitor,
        records: Arc<InMemoryRecordStore>,
        publisher: Arc<RecordingPublisher>,
    }

    fn fixture() -> Fixture {
        let devices = Arc::new(InMemoryDeviceRegistry::with_vehicles([Vehicle::new("111", "Van", 60.0)]));
        let records = Arc::new(InMemoryRecordStore::default());
        let publisher = Arc::new(RecordingPublisher::new());
        let monitor = TimeoutMonitor::new(devices, records.clone(), publisher.clone(), MonitorConfig::default());
        Fixture {
            monitor,
            records,
            publisher,
        }
    }

    fn record(age_secs: i64, speed: f64, ignition: bool) -> GpsRecord {
        let mut record = GpsRecord::new("111", Utc::now() - ChronoDuration::seconds(age_secs), "GPS");
        record.speed = Some(speed);
        record.status.ignition = Some(ignition);
        record
    }

    async fn sweep_with(record: Option<GpsRecord>) -> DeviceState {
        let f = fixture();
        if let Some(record) = record {
            f.records.insert(record).await.unwrap();
        }
        let events = f.monitor.sweep_once().await;
        assert_eq!(events.len(), 1);
        events[0].state
    }

    #[tokio::test]
    async fn no_records_is_no_data() {
        assert_eq!(sweep_with(None).await, DeviceState::NoData);
    }

    #[tokio::test]
    async fn two_hour_old_record_is_inactive() {
        assert_eq!(sweep_with(Some(record(7200, 30.0, true))).await, DeviceState::Inactive);
    }

    #[tokio::test]
    async fn moving_under_limit_is_running() {
        assert_eq!(sweep_with(Some(record(120, 30.0, true))).await, DeviceState::Running);
    }

    #[tokio::test]
    async fn remaining_states() {
        assert_eq!(sweep_with(Some(record(120, 75.0, true))).await, DeviceState::Overspeed);
        assert_eq!(sweep_with(Some(record(120, 0.0, true))).await, DeviceState::Idle);
        assert_eq!(sweep_with(Some(record(120, 0.0, false))).await, DeviceState::Stopped);
    }

    #[tokio::test]
    async fn sweep_publishes_with_stale_record() {
        let f = fixture();
        f.records.insert(record(7200, 0.0, false)).await.unwrap();
        f.monitor.sweep_once().await;

        let events = f.publisher.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            FleetEvent::DeviceStatus(event) => {
                assert_eq!(event.state, DeviceState::Inactive);
                assert!(event.last_record.is_some());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
