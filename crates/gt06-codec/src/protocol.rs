//! Protocol numbers

use serde::Serialize;

/// Protocol number of a GT06 frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// 0x01
    Login,
    /// GPS/LBS family: 0x12, 0x1A, 0x22, 0xA0
    Location(u8),
    /// 0x13, status / heartbeat
    Status,
    /// 0x16
    Alarm,
    /// Reply to a server command: 0x15, 0x21
    CommandReply(u8),
    Unknown(u8),
}

impl From<u8> for Protocol {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Protocol::Login,
            0x12 | 0x1A | 0x22 | 0xA0 => Protocol::Location(value),
            0x13 => Protocol::Status,
            0x16 => Protocol::Alarm,
            0x15 | 0x21 => Protocol::CommandReply(value),
            other => Protocol::Unknown(other),
        }
    }
}

impl Protocol {
    /// Protocol number on the wire
    pub fn number(&self) -> u8 {
        match self {
            Protocol::Login => 0x01,
            Protocol::Status => 0x13,
            Protocol::Alarm => 0x16,
            Protocol::Location(n) | Protocol::CommandReply(n) | Protocol::Unknown(n) => *n,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Login => "LOGIN",
            Protocol::Location(_) => "GPS",
            Protocol::Status => "STATUS",
            Protocol::Alarm => "ALARM",
            Protocol::CommandReply(_) => "COMMAND_REPLY",
            Protocol::Unknown(_) => "UNKNOWN",
        }
    }

    /// Whether the device expects an acknowledgement frame
    pub fn needs_ack(&self) -> bool {
        matches!(self, Protocol::Login | Protocol::Status | Protocol::Alarm)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), self.number())
    }
}
