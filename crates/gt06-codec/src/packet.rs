//! Decoded packet types

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::Protocol;
use crate::status::{GsmSignal, TerminalInfo, VoltageLevel};

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryPacket {
    /// Whole frame as uppercase hex
    pub raw: String,
    pub received_at: DateTime<Utc>,
    /// Value of the length field
    pub length: usize,
    pub protocol: Protocol,
    pub serial: u16,
    pub checksum: u16,
    /// CRC-ITU over length..serial matched the checksum field
    pub checksum_valid: bool,
    pub needs_ack: bool,
    pub body: PacketBody,
}

impl TelemetryPacket {
    pub fn protocol_name(&self) -> &'static str {
        self.protocol.name()
    }

    /// GPS time for location-bearing frames, receipt time otherwise
    pub fn timestamp(&self) -> DateTime<Utc> {
        let gps_time = match &self.body {
            PacketBody::Location(fix) => fix.gps_time,
            PacketBody::Alarm { fix, .. } => fix.as_ref().and_then(|f| f.gps_time),
            _ => None,
        };
        gps_time.unwrap_or(self.received_at)
    }
}

/// Protocol-specific content of a packet
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PacketBody {
    Login(LoginInfo),
    Location(GpsFix),
    Status(StatusInfo),
    Alarm {
        flags: AlarmFlags,
        fix: Option<GpsFix>,
    },
    CommandReply(CommandReply),
    Unknown {
        payload: String,
    },
}

/// Login request content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginInfo {
    /// Terminal ID as 16 hex digits
    pub terminal_id: String,
    pub device_type: Option<u16>,
    /// Offset from UTC in minutes, negative west of Greenwich
    pub timezone_offset_minutes: Option<i32>,
}

impl LoginInfo {
    /// IMEI derived from the terminal ID.
    ///
    /// The terminal ID is the 15-digit IMEI left-padded with one `0`.
    pub fn imei(&self) -> &str {
        let id = self.terminal_id.as_str();
        if id.len() == 16 {
            id.strip_prefix('0').unwrap_or(id)
        } else {
            id
        }
    }
}

/// Serving cell tower
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellTower {
    pub mcc: u16,
    pub mnc: u8,
    pub lac: u16,
    pub cell_id: u32,
}

/// Position report from the GPS/LBS family of frames
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsFix {
    pub gps_time: Option<DateTime<Utc>>,
    /// Degrees, negative south
    pub latitude: f64,
    /// Degrees, negative west
    pub longitude: f64,
    /// km/h
    pub speed: u8,
    /// Degrees from north, 0-359
    pub course: u16,
    /// Meters
    pub altitude: Option<i16>,
    pub satellites: u8,
    pub gps_info_len: u8,
    pub real_time: bool,
    pub positioned: bool,
    pub north: bool,
    pub west: bool,
    pub cell: Option<CellTower>,
    /// Ignition from the ACC byte of 0x22 frames
    pub acc: Option<bool>,
}

impl GpsFix {
    /// Coordinates, or `None` when the device reported no position at all
    pub fn position(&self) -> Option<(f64, f64)> {
        if self.latitude == 0.0 && self.longitude == 0.0 {
            None
        } else {
            Some((self.latitude, self.longitude))
        }
    }
}

/// Status / heartbeat content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusInfo {
    pub terminal: TerminalInfo,
    pub voltage: VoltageLevel,
    pub gsm: GsmSignal,
}

/// Alarm bitmask of 0x16 frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlarmFlags {
    pub emergency: bool,
    pub overspeed: bool,
    pub low_power: bool,
    pub shock: bool,
    pub geofence_in: bool,
    pub geofence_out: bool,
    pub no_operation_timeout: bool,
    pub distance: bool,
}

impl AlarmFlags {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            emergency: byte & 0x01 != 0,
            overspeed: byte & 0x02 != 0,
            low_power: byte & 0x04 != 0,
            shock: byte & 0x08 != 0,
            geofence_in: byte & 0x10 != 0,
            geofence_out: byte & 0x20 != 0,
            no_operation_timeout: byte & 0x40 != 0,
            distance: byte & 0x80 != 0,
        }
    }

    /// Names of the raised flags
    pub fn active(&self) -> Vec<&'static str> {
        [
            (self.emergency, "emergency"),
            (self.overspeed, "overspeed"),
            (self.low_power, "low_power"),
            (self.shock, "shock"),
            (self.geofence_in, "geofence_in"),
            (self.geofence_out, "geofence_out"),
            (self.no_operation_timeout, "no_operation_timeout"),
            (self.distance, "distance"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }
}

/// Text reply to a server command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    /// Correlation key echoed from the command frame
    pub server_flag: u32,
    pub text: String,
}
