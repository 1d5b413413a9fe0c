//! Alert evaluation in front of the record store
//!
//! [`AlertGate`] is the notification gate used by the daemon. It derives
//! alerts from each record about to be stored, forwards new ones to an
//! [`AlertSink`], and suppresses repeats of the same alert per device for a
//! cooldown period. A sink failure vetoes the record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_core::{
    AlarmType, CollaboratorError, CollaboratorResult, DeviceRegistry, GpsRecord, NotificationGate, RecordStore,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::AlertConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Overspeed,
    PowerCut,
    Sos,
    LowBattery,
    IgnitionOn,
    IgnitionOff,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertKind::Overspeed => "overspeed",
            AlertKind::PowerCut => "power_cut",
            AlertKind::Sos => "sos",
            AlertKind::LowBattery => "low_battery",
            AlertKind::IgnitionOn => "ignition_on",
            AlertKind::IgnitionOff => "ignition_off",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub imei: String,
    pub vehicle: Option<String>,
    pub kind: AlertKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Push notification backend
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> CollaboratorResult<()>;
}

/// Sink that only logs
#[derive(Debug, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn deliver(&self, alert: &Alert) -> CollaboratorResult<()> {
        info!(imei = %alert.imei, kind = %alert.kind, message = %alert.message, "Alert");
        Ok(())
    }
}

/// Notification gate with per-device alert dedupe
pub struct AlertGate {
    devices: Arc<dyn DeviceRegistry>,
    records: Arc<dyn RecordStore>,
    sink: Arc<dyn AlertSink>,
    cooldown: Duration,
    recent: Mutex<HashMap<(String, AlertKind), Instant>>,
}

impl AlertGate {
    pub fn new(
        devices: Arc<dyn DeviceRegistry>,
        records: Arc<dyn RecordStore>,
        sink: Arc<dyn AlertSink>,
        config: &AlertConfig,
    ) -> Self {
        Self {
            devices,
            records,
            sink,
            cooldown: Duration::from_secs(config.cooldown_secs),
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Periodically drop dedupe entries older than the cooldown
    pub fn spawn_cleanup(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.cleanup();
                if removed > 0 {
                    debug!(removed, "Expired alert dedupe entries");
                }
            }
        })
    }

    /// Remove expired dedupe entries, returning how many were dropped
    pub fn cleanup(&self) -> usize {
        let mut recent = self.recent.lock();
        let before = recent.len();
        recent.retain(|_, sent| sent.elapsed() < self.cooldown);
        before - recent.len()
    }

    pub fn tracked(&self) -> usize {
        self.recent.lock().len()
    }

    async fn derive_alerts(&self, record: &GpsRecord) -> CollaboratorResult<Vec<Alert>> {
        let vehicle = self.devices.vehicle_by_imei(&record.imei).await?;
        let name = vehicle.as_ref().map(|v| v.name.clone());
        let label = name.clone().unwrap_or_else(|| record.imei.clone());
        let mut kinds = Vec::new();

        if let (Some(vehicle), Some(speed)) = (&vehicle, record.speed) {
            if speed > vehicle.overspeed_limit {
                kinds.push((
                    AlertKind::Overspeed,
                    format!("{} at {:.0} km/h exceeds {:.0} km/h", label, speed, vehicle.overspeed_limit),
                ));
            }
        }

        match record.alarm {
            Some(AlarmType::PowerCut) => kinds.push((AlertKind::PowerCut, format!("{}: power cut", label))),
            Some(AlarmType::Sos) => kinds.push((AlertKind::Sos, format!("{}: SOS", label))),
            Some(AlarmType::LowBattery) => kinds.push((AlertKind::LowBattery, format!("{}: low battery", label))),
            Some(AlarmType::Shock) | None => {}
        }

        if let Some(ignition) = record.status.ignition {
            let previous = self
                .records
                .most_recent_by_imei(&record.imei, 1)
                .await?
                .pop()
                .and_then(|r| r.status.ignition);
            if previous.is_some_and(|p| p != ignition) {
                if ignition {
                    kinds.push((AlertKind::IgnitionOn, format!("{}: ignition on", label)));
                } else {
                    kinds.push((AlertKind::IgnitionOff, format!("{}: ignition off", label)));
                }
            }
        }

        Ok(kinds
            .into_iter()
            .map(|(kind, message)| Alert {
                imei: record.imei.clone(),
                vehicle: name.clone(),
                kind,
                message,
                at: record.timestamp,
            })
            .collect())
    }

    fn is_suppressed(&self, imei: &str, kind: AlertKind) -> bool {
        self.recent
            .lock()
            .get(&(imei.to_string(), kind))
            .is_some_and(|sent| sent.elapsed() < self.cooldown)
    }
}

#[async_trait]
impl NotificationGate for AlertGate {
    async fn check_and_notify(&self, record: &GpsRecord) -> CollaboratorResult<()> {
        for alert in self.derive_alerts(record).await? {
            if self.is_suppressed(&alert.imei, alert.kind) {
                debug!(imei = %alert.imei, kind = %alert.kind, "Alert suppressed by cooldown");
                continue;
            }
            self.sink
                .deliver(&alert)
                .await
                .map_err(|e| CollaboratorError::Notification(format!("{} alert: {}", alert.kind, e)))?;
            self.recent.lock().insert((alert.imei.clone(), alert.kind), Instant::now());
        }
        Ok(())
    }
}
