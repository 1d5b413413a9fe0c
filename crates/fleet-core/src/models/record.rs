//! Persisted telemetry record

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Alarm reported through the terminal-info byte of a status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmType {
    Shock,
    PowerCut,
    LowBattery,
    Sos,
}

impl std::fmt::Display for AlarmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlarmType::Shock => "shock",
            AlarmType::PowerCut => "power_cut",
            AlarmType::LowBattery => "low_battery",
            AlarmType::Sos => "sos",
        };
        f.write_str(s)
    }
}

/// Serving cell tower (LBS data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInfo {
    pub mcc: u16,
    pub mnc: u8,
    pub lac: u16,
    pub cell_id: u32,
}

/// Device status flags decoded from the terminal-info byte
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignition: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charging: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps_tracking: Option<bool>,
    /// Fuel/electricity relay closed (engine can run)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oil_connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated: Option<bool>,
}

/// Battery and GSM readings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsm_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsm_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsm_bars: Option<u8>,
}

/// A validated telemetry record as handed to the record store.
///
/// Records are append-only: once inserted they are never mutated, and the
/// session pipeline only ever reads the most recent ones per IMEI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsRecord {
    pub imei: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Speed in km/h
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Course in degrees from north
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    /// Altitude in meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satellites: Option<u8>,
    #[serde(default)]
    pub status: StatusFlags,
    #[serde(default)]
    pub signal: SignalInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell: Option<CellInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm: Option<AlarmType>,
    /// Raw frame as uppercase hex
    pub raw: String,
    /// Protocol name of the frame this record came from
    pub protocol: String,
}

impl GpsRecord {
    /// Create an empty record for a device at a point in time
    pub fn new(imei: impl Into<String>, timestamp: DateTime<Utc>, protocol: impl Into<String>) -> Self {
        Self {
            imei: imei.into(),
            timestamp,
            latitude: None,
            longitude: None,
            speed: None,
            course: None,
            altitude: None,
            satellites: None,
            status: StatusFlags::default(),
            signal: SignalInfo::default(),
            cell: None,
            alarm: None,
            raw: String::new(),
            protocol: protocol.into(),
        }
    }

    /// Latitude/longitude pair when both are present
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// Time elapsed since this record was taken
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_requires_both_coordinates() {
        let mut record = GpsRecord::new("358899051234567", Utc::now(), "GPS");
        assert_eq!(record.position(), None);

        record.latitude = Some(27.7);
        assert_eq!(record.position(), None);

        record.longitude = Some(85.3);
        assert_eq!(record.position(), Some((27.7, 85.3)));
    }

    #[test]
    fn serializes_without_empty_fields() {
        let record = GpsRecord::new("358899051234567", Utc::now(), "STATUS");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("latitude").is_none());
        assert_eq!(json["protocol"], "STATUS");
    }
}
