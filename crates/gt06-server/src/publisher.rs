//! Broadcast fan-out of session events

use fleet_core::{DeviceStatusEvent, EventPublisher, FleetEvent, GpsRecord};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Event publisher over a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<FleetEvent>,
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn send(&self, event: FleetEvent) {
        // No subscribers is not an error
        if self.tx.send(event).is_err() {
            debug!("Event dropped, no subscribers");
        }
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish_location(&self, record: &GpsRecord) {
        self.send(FleetEvent::Location(record.clone()));
    }

    fn publish_status(&self, record: &GpsRecord) {
        self.send(FleetEvent::Status(record.clone()));
    }

    fn publish_device_status(&self, _imei: &str, event: DeviceStatusEvent) {
        self.send(FleetEvent::DeviceStatus(event));
    }
}

/// Log every event from `rx` until the channel closes
pub async fn log_events(mut rx: broadcast::Receiver<FleetEvent>) {
    loop {
        match rx.recv().await {
            Ok(FleetEvent::DeviceStatus(event)) => {
                info!(imei = %event.imei, state = %event.state, "Device status");
            }
            Ok(event) => {
                debug!(imei = %event.imei(), kind = event.kind(), "Telemetry event");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event logger lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
