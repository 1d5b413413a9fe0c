//! Relay control commands
//!
//! Builds command frames, hands them to the connection task that owns the
//! device socket, and classifies the device's text reply.

use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleet_core::{ControlCommand, ControlResponse};
use gt06_codec::{encode_command, CommandChecksum};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::config::ControlConfig;
use crate::error::ControlError;
use crate::registry::{ConnectionRegistry, OutboundCommand};

/// Sends control commands to connected devices
pub struct ControlClient {
    registry: Arc<ConnectionRegistry>,
    serial: AtomicU16,
    server_flag: AtomicU32,
    reply_timeout: Duration,
    checksum: CommandChecksum,
}

impl ControlClient {
    pub fn new(registry: Arc<ConnectionRegistry>, config: &ControlConfig) -> Self {
        Self {
            registry,
            serial: AtomicU16::new(1),
            server_flag: AtomicU32::new(1),
            reply_timeout: Duration::from_secs(config.reply_timeout_secs),
            checksum: config.checksum,
        }
    }

    /// Send `command` to the device and wait for its reply.
    ///
    /// Never fails: errors are reported as an unsuccessful response.
    pub async fn send_command(&self, imei: &str, command: ControlCommand) -> ControlResponse {
        info!(imei = %imei, %command, "Sending control command");

        match self.dispatch(imei, command).await {
            Ok(text) => {
                let (success, message) = classify_reply(command, &text);
                info!(imei = %imei, %command, success, reply = %text, "Control command completed");
                ControlResponse {
                    command,
                    imei: imei.to_string(),
                    success,
                    message,
                    raw_response: Some(text),
                    timestamp: Utc::now(),
                }
            }
            Err(e) => {
                warn!(imei = %imei, %command, error = %e, "Control command failed");
                ControlResponse::failure(command, imei, e.to_string())
            }
        }
    }

    async fn dispatch(&self, imei: &str, command: ControlCommand) -> Result<String, ControlError> {
        let handle = self
            .registry
            .get(imei)
            .ok_or_else(|| ControlError::DeviceOffline(imei.to_string()))?;

        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        let server_flag = self.server_flag.fetch_add(1, Ordering::Relaxed);
        let frame = encode_command(server_flag, command.literal(), serial, self.checksum)?;

        let (reply, rx) = oneshot::channel();
        handle
            .send(OutboundCommand {
                command,
                frame,
                server_flag,
                reply,
            })
            .await
            .map_err(|_| ControlError::ConnectionClosed)?;

        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply.text),
            Ok(Err(_)) => Err(ControlError::ConnectionClosed),
            Err(_) => Err(ControlError::Timeout(self.reply_timeout.as_secs())),
        }
    }
}

/// Map a device reply to (success, message)
pub fn classify_reply(command: ControlCommand, reply: &str) -> (bool, String) {
    match command {
        ControlCommand::CutOil => {
            if reply.contains("Success") {
                (true, "oil cut".to_string())
            } else if reply.contains("Speed Limit") {
                (false, "cannot cut oil, speed too high".to_string())
            } else if reply.contains("Unvalued Fix") {
                (false, "GPS tracking is off".to_string())
            } else {
                (false, "unrecognised reply".to_string())
            }
        }
        ControlCommand::ConnectOil => {
            if reply.contains("Success") {
                (true, "oil connected".to_string())
            } else if reply.contains("Fail") {
                (false, "device failed to connect oil".to_string())
            } else {
                (false, "unrecognised reply".to_string())
            }
        }
        ControlCommand::GetLocation => {
            let text = reply.trim();
            (!text.is_empty(), text.to_string())
        }
    }
}
