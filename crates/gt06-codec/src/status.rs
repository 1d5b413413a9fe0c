//! Terminal-info, voltage and GSM decoding for status frames

use serde::Serialize;

/// Alarm code carried in bits 3-5 of the terminal-info byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmCode {
    Normal,
    Shock,
    PowerCut,
    LowBattery,
    Sos,
    /// Code not assigned by the protocol
    Reserved(u8),
}

impl AlarmCode {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => AlarmCode::Normal,
            1 => AlarmCode::Shock,
            2 => AlarmCode::PowerCut,
            3 => AlarmCode::LowBattery,
            4 => AlarmCode::Sos,
            other => AlarmCode::Reserved(other),
        }
    }

    pub fn is_alarm(&self) -> bool {
        !matches!(self, AlarmCode::Normal | AlarmCode::Reserved(_))
    }
}

/// Decoded terminal-info byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TerminalInfo {
    pub activated: bool,
    pub ignition: bool,
    pub charging: bool,
    pub alarm: AlarmCode,
    pub gps_tracking: bool,
    /// Fuel/electricity relay closed; the wire bit is inverted
    pub oil_connected: bool,
}

impl TerminalInfo {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            activated: byte & 0x01 != 0,
            ignition: byte & 0x02 != 0,
            charging: byte & 0x04 != 0,
            alarm: AlarmCode::from_bits(byte >> 3),
            gps_tracking: byte & 0x40 != 0,
            oil_connected: byte & 0x80 == 0,
        }
    }
}

const VOLTAGE_LABELS: [&str; 7] = [
    "no_power",
    "extremely_low",
    "very_low",
    "low",
    "medium",
    "high",
    "full",
];
const VOLTAGE_PERCENT: [u8; 7] = [0, 10, 25, 40, 60, 80, 100];

/// Battery voltage level 0-6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoltageLevel {
    pub level: u8,
    pub label: &'static str,
    pub percent: Option<u8>,
}

impl VoltageLevel {
    pub fn from_byte(level: u8) -> Self {
        let idx = level as usize;
        Self {
            level,
            label: VOLTAGE_LABELS.get(idx).copied().unwrap_or("unknown"),
            percent: VOLTAGE_PERCENT.get(idx).copied(),
        }
    }
}

const GSM_LABELS: [&str; 5] = ["no_signal", "extremely_weak", "weak", "good", "strong"];

/// GSM signal strength 0-4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GsmSignal {
    pub level: u8,
    pub label: &'static str,
    pub bars: Option<u8>,
}

impl GsmSignal {
    pub fn from_byte(level: u8) -> Self {
        let known = (level as usize) < GSM_LABELS.len();
        Self {
            level,
            label: GSM_LABELS.get(level as usize).copied().unwrap_or("unknown"),
            bars: known.then_some(level),
        }
    }
}
