//! Location and status processing

use chrono::{Duration, Utc};
use fleet_core::{AlarmType, CellInfo, GpsRecord, SignalInfo, StatusFlags};
use gt06_codec::{AlarmCode, GpsFix, StatusInfo, TelemetryPacket};
use tracing::{debug, error, info, warn};

use super::SessionManager;

impl SessionManager {
    pub(super) async fn process_location(&self, imei: &str, packet: &TelemetryPacket, fix: &GpsFix) {
        let history = match self.collaborators.records.most_recent_by_imei(imei, 2).await {
            Ok(history) => history,
            Err(e) => {
                error!(imei = %imei, error = %e, "Failed to load recent records, dropping point");
                return;
            }
        };

        let candidate = location_record(imei, packet, fix, history.first());
        let record = match self.pipeline.evaluate(candidate, fix.positioned, &history) {
            Ok(record) => record,
            Err(rejection) => {
                debug!(imei = %imei, reason = %rejection, "GPS point rejected");
                return;
            }
        };

        if let Err(e) = self.collaborators.gate.check_and_notify(&record).await {
            warn!(imei = %imei, error = %e, "Notification gate vetoed location");
            return;
        }
        match self.collaborators.records.insert(record.clone()).await {
            Ok(()) => self.collaborators.publisher.publish_location(&record),
            Err(e) => error!(imei = %imei, error = %e, "Failed to store location"),
        }
    }

    pub(super) async fn process_status(&self, imei: &str, packet: &TelemetryPacket, status: &StatusInfo) {
        let last = match self.collaborators.records.most_recent_by_imei(imei, 1).await {
            Ok(mut records) => records.pop(),
            Err(e) => {
                error!(imei = %imei, error = %e, "Failed to load recent records, dropping status");
                return;
            }
        };

        let ignition = status.terminal.ignition;
        let window = Duration::seconds(self.pipeline.config().status_suppress_secs as i64);
        if let Some(last) = &last {
            if last.status.ignition == Some(ignition) && last.age(Utc::now()) < window {
                debug!(imei = %imei, ignition, "Status unchanged, suppressed");
                return;
            }
        }

        let record = status_record(imei, packet, status, last.as_ref());
        if let Some(alarm) = record.alarm {
            info!(imei = %imei, %alarm, "Status frame carries alarm");
        }

        if let Err(e) = self.collaborators.gate.check_and_notify(&record).await {
            warn!(imei = %imei, error = %e, "Notification gate vetoed status");
            return;
        }
        match self.collaborators.records.insert(record.clone()).await {
            Ok(()) => self.collaborators.publisher.publish_status(&record),
            Err(e) => error!(imei = %imei, error = %e, "Failed to store status"),
        }
    }
}

/// Candidate record for a GPS frame, carrying forward the last known status
fn location_record(imei: &str, packet: &TelemetryPacket, fix: &GpsFix, last: Option<&GpsRecord>) -> GpsRecord {
    let mut record = GpsRecord::new(imei, packet.timestamp(), packet.protocol_name());
    if let Some((lat, lon)) = fix.position() {
        record.latitude = Some(lat);
        record.longitude = Some(lon);
    }
    record.speed = Some(f64::from(fix.speed));
    record.course = Some(f64::from(fix.course));
    record.altitude = fix.altitude.map(f64::from);
    record.satellites = Some(fix.satellites);
    record.cell = fix.cell.map(|c| CellInfo {
        mcc: c.mcc,
        mnc: c.mnc,
        lac: c.lac,
        cell_id: c.cell_id,
    });
    record.raw = packet.raw.clone();

    if let Some(last) = last {
        record.status = last.status.clone();
        record.signal = last.signal.clone();
    }
    if let Some(acc) = fix.acc {
        record.status.ignition = Some(acc);
    }
    record
}

/// Record for a status frame, carrying forward the last known position
fn status_record(imei: &str, packet: &TelemetryPacket, status: &StatusInfo, last: Option<&GpsRecord>) -> GpsRecord {
    let terminal = &status.terminal;
    let mut record = GpsRecord::new(imei, packet.received_at, packet.protocol_name());
    record.status = StatusFlags {
        ignition: Some(terminal.ignition),
        charging: Some(terminal.charging),
        gps_tracking: Some(terminal.gps_tracking),
        oil_connected: Some(terminal.oil_connected),
        activated: Some(terminal.activated),
    };
    record.signal = SignalInfo {
        voltage_level: Some(status.voltage.level),
        voltage_status: Some(status.voltage.label.to_string()),
        battery_percent: status.voltage.percent,
        gsm_level: Some(status.gsm.level),
        gsm_status: Some(status.gsm.label.to_string()),
        gsm_bars: status.gsm.bars,
    };
    record.alarm = alarm_type(terminal.alarm);
    record.raw = packet.raw.clone();

    if let Some(last) = last {
        record.latitude = last.latitude;
        record.longitude = last.longitude;
        record.speed = last.speed;
        record.course = last.course;
        record.altitude = last.altitude;
        record.satellites = last.satellites;
        record.cell = last.cell;
    }
    record
}

fn alarm_type(code: AlarmCode) -> Option<AlarmType> {
    match code {
        AlarmCode::Shock => Some(AlarmType::Shock),
        AlarmCode::PowerCut => Some(AlarmType::PowerCut),
        AlarmCode::LowBattery => Some(AlarmType::LowBattery),
        AlarmCode::Sos => Some(AlarmType::Sos),
        AlarmCode::Normal | AlarmCode::Reserved(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use gt06_codec::{decode_frame, encode_frame, PacketBody};

    use super::*;

    fn status_packet(terminal: u8) -> (TelemetryPacket, StatusInfo) {
        let packet = decode_frame(&encode_frame(0x13, &[terminal, 0x04, 0x03], 1)).unwrap();
        let PacketBody::Status(status) = packet.body.clone() else {
            panic!("expected status body");
        };
        (packet, status)
    }

    #[test]
    fn status_record_carries_position() {
        let mut last = GpsRecord::new("111", Utc::now(), "GPS");
        last.latitude = Some(27.7);
        last.longitude = Some(85.3);
        last.speed = Some(12.0);

        // ignition on, SOS
        let (packet, status) = status_packet(0x22);
        let record = status_record("111", &packet, &status, Some(&last));

        assert_eq!(record.position(), Some((27.7, 85.3)));
        assert_eq!(record.speed, Some(12.0));
        assert_eq!(record.status.ignition, Some(true));
        assert_eq!(record.alarm, Some(AlarmType::Sos));
        assert_eq!(record.signal.voltage_status.as_deref(), Some("medium"));
        assert_eq!(record.protocol, "STATUS");
    }

    #[test]
    fn location_record_inherits_status() {
        let mut last = GpsRecord::new("111", Utc::now(), "STATUS");
        last.status.ignition = Some(true);
        last.signal.gsm_bars = Some(3);

        let mut payload = vec![24, 3, 15, 10, 20, 30, 0xC9];
        payload.extend_from_slice(&49_860_000u32.to_be_bytes());
        payload.extend_from_slice(&153_540_000u32.to_be_bytes());
        payload.extend_from_slice(&[30, 0x14, 0x00]);
        let packet = decode_frame(&encode_frame(0x12, &payload, 2)).unwrap();
        let PacketBody::Location(fix) = packet.body.clone() else {
            panic!("expected location body");
        };

        let record = location_record("111", &packet, &fix, Some(&last));
        assert_eq!(record.status.ignition, Some(true));
        assert_eq!(record.signal.gsm_bars, Some(3));
        assert_eq!(record.speed, Some(30.0));
        assert_eq!(record.satellites, Some(9));
        assert_eq!(record.position(), Some((27.7, 85.3)));
    }
}
