//! Relay control command/response pair

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Commands the control channel can send to a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlCommand {
    /// Cut the fuel/ignition relay
    CutOil,
    /// Restore the fuel/ignition relay
    ConnectOil,
    /// Ask for the current position as text
    GetLocation,
}

impl ControlCommand {
    /// ASCII literal sent inside the command frame
    pub fn literal(&self) -> &'static str {
        match self {
            ControlCommand::CutOil => "DYD#",
            ControlCommand::ConnectOil => "HFYD#",
            ControlCommand::GetLocation => "DWXX#",
        }
    }

    /// Whether free-standing reply `text` could answer this command.
    ///
    /// Relay replies echo the command word (`DYD=...`, `HFYD=...`). Location
    /// replies vary by firmware, so they only need to not be a relay reply.
    pub fn accepts_reply(&self, text: &str) -> bool {
        let text = text.trim_start().to_ascii_uppercase();
        match self {
            ControlCommand::CutOil => text.starts_with("DYD"),
            ControlCommand::ConnectOil => text.starts_with("HFYD"),
            ControlCommand::GetLocation => {
                text.starts_with("DWXX") || !(text.starts_with("DYD") || text.starts_with("HFYD"))
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::CutOil => "cut-oil",
            ControlCommand::ConnectOil => "connect-oil",
            ControlCommand::GetLocation => "get-location",
        }
    }
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cut-oil" | "cut_oil" => Ok(ControlCommand::CutOil),
            "connect-oil" | "connect_oil" => Ok(ControlCommand::ConnectOil),
            "get-location" | "get_location" => Ok(ControlCommand::GetLocation),
            other => Err(format!("unknown command: {}", other)),
        }
    }
}

/// Outcome of a control command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub command: ControlCommand,
    pub imei: String,
    pub success: bool,
    /// Classified, human-readable outcome
    pub message: String,
    /// Reply text exactly as the device sent it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ControlResponse {
    pub fn failure(command: ControlCommand, imei: &str, message: impl Into<String>) -> Self {
        Self {
            command,
            imei: imei.to_string(),
            success: false,
            message: message.into(),
            raw_response: None,
            timestamp: Utc::now(),
        }
    }
}
