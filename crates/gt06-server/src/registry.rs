//! Live connection registry
//!
//! Maps an authenticated IMEI to a handle on the task that owns the
//! device's socket. The handle is a channel endpoint, never the socket:
//! only the connection task reads from or writes to its stream.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fleet_core::ControlCommand;
use gt06_codec::CommandReply;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Command frame queued for a connection task
#[derive(Debug)]
pub struct OutboundCommand {
    pub command: ControlCommand,
    pub frame: Vec<u8>,
    /// Correlation key the device echoes in its reply
    pub server_flag: u32,
    pub reply: oneshot::Sender<CommandReply>,
}

/// Handle on a live, authenticated connection
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    pub connection_id: Uuid,
    pub imei: String,
    pub connected_at: DateTime<Utc>,
    outbox: mpsc::Sender<OutboundCommand>,
}

impl DeviceHandle {
    pub fn new(connection_id: Uuid, imei: impl Into<String>, outbox: mpsc::Sender<OutboundCommand>) -> Self {
        Self {
            connection_id,
            imei: imei.into(),
            connected_at: Utc::now(),
            outbox,
        }
    }

    /// Queue a command for the connection task.
    ///
    /// Fails when the connection task has already exited.
    pub async fn send(&self, command: OutboundCommand) -> Result<(), OutboundCommand> {
        self.outbox.send(command).await.map_err(|e| e.0)
    }
}

/// Summary of an online device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnlineDevice {
    pub imei: String,
    pub connection_id: Uuid,
    pub connected_at: DateTime<Utc>,
}

/// IMEI to live connection map
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, DeviceHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning the handle it replaced
    pub fn insert(&self, handle: DeviceHandle) -> Option<DeviceHandle> {
        self.connections.lock().insert(handle.imei.clone(), handle)
    }

    pub fn get(&self, imei: &str) -> Option<DeviceHandle> {
        self.connections.lock().get(imei).cloned()
    }

    /// Remove the entry for `imei` only if it belongs to `connection_id`
    pub fn remove_if(&self, imei: &str, connection_id: Uuid) -> bool {
        let mut connections = self.connections.lock();
        match connections.get(imei) {
            Some(handle) if handle.connection_id == connection_id => {
                connections.remove(imei);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, imei: &str) -> bool {
        self.connections.lock().contains_key(imei)
    }

    /// IMEIs currently online
    pub fn snapshot(&self) -> Vec<String> {
        let mut imeis: Vec<String> = self.connections.lock().keys().cloned().collect();
        imeis.sort();
        imeis
    }

    pub fn online(&self) -> Vec<OnlineDevice> {
        let mut devices: Vec<OnlineDevice> = self
            .connections
            .lock()
            .values()
            .map(|h| OnlineDevice {
                imei: h.imei.clone(),
                connection_id: h.connection_id,
                connected_at: h.connected_at,
            })
            .collect();
        devices.sort_by(|a, b| a.imei.cmp(&b.imei));
        devices
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
