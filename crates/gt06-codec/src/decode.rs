//! Per-protocol payload decoders

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{FrameError, FrameResult};
use crate::packet::{AlarmFlags, CellTower, CommandReply, GpsFix, LoginInfo, PacketBody, StatusInfo};
use crate::protocol::Protocol;
use crate::status::{GsmSignal, TerminalInfo, VoltageLevel};

/// Raw coordinate units per degree
pub const COORDINATE_DIVISOR: f64 = 1_800_000.0;

/// Fixed part of a GPS body: datetime(6) info(1) lat(4) lon(4) speed(1) course(2)
const GPS_FIXED_LEN: usize = 18;

/// Cell block: mcc(2) mnc(1) lac(2) cell id(3)
const CELL_LEN: usize = 8;

const COURSE_MASK: u16 = 0x03FF;
const NORTH_BIT: u16 = 0x0400;
const WEST_BIT: u16 = 0x0800;
const POSITIONED_BIT: u16 = 0x1000;
const REAL_TIME_BIT: u16 = 0x2000;

const ACC_PROTOCOL: u8 = 0x22;

/// Decode the payload of a frame according to its protocol number
pub fn decode_body(protocol: Protocol, payload: &[u8]) -> FrameResult<PacketBody> {
    match protocol {
        Protocol::Login => decode_login(payload).map(PacketBody::Login),
        Protocol::Location(n) => decode_gps(n, payload).map(PacketBody::Location),
        Protocol::Status => decode_status(payload).map(PacketBody::Status),
        Protocol::Alarm => decode_alarm(payload),
        Protocol::CommandReply(n) => decode_command_reply(n, payload).map(PacketBody::CommandReply),
        Protocol::Unknown(_) => Ok(PacketBody::Unknown {
            payload: hex::encode_upper(payload),
        }),
    }
}

fn require(protocol: u8, payload: &[u8], need: usize) -> FrameResult<()> {
    if payload.len() < need {
        return Err(FrameError::PayloadTruncated {
            protocol,
            need,
            got: payload.len(),
        });
    }
    Ok(())
}

fn be_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub fn decode_login(payload: &[u8]) -> FrameResult<LoginInfo> {
    require(0x01, payload, 8)?;

    let terminal_id = hex::encode_upper(&payload[..8]);
    let device_type = payload.get(8..10).map(be_u16);
    let timezone_offset_minutes = payload.get(10..12).map(|b| decode_timezone(be_u16(b)));

    Ok(LoginInfo {
        terminal_id,
        device_type,
        timezone_offset_minutes,
    })
}

/// Timezone word: high 12 bits are hours*100 + minutes, bit 3 set means west
fn decode_timezone(word: u16) -> i32 {
    let hhmm = i32::from(word >> 4);
    let minutes = (hhmm / 100) * 60 + hhmm % 100;
    if word & 0x0008 != 0 {
        -minutes
    } else {
        minutes
    }
}

/// Decode a GPS/LBS body
pub fn decode_gps(protocol: u8, payload: &[u8]) -> FrameResult<GpsFix> {
    require(protocol, payload, GPS_FIXED_LEN)?;

    let gps_time = decode_datetime(&payload[0..6]);
    let info = payload[6];
    let raw_lat = be_u32(&payload[7..11]);
    let raw_lon = be_u32(&payload[11..15]);
    let speed = payload[15];
    let word = be_u16(&payload[16..18]);

    let north = word & NORTH_BIT != 0;
    let west = word & WEST_BIT != 0;

    let mut latitude = f64::from(raw_lat) / COORDINATE_DIVISOR;
    let mut longitude = f64::from(raw_lon) / COORDINATE_DIVISOR;
    if !north {
        latitude = -latitude;
    }
    if west {
        longitude = -longitude;
    }

    let mut altitude = None;
    let mut cell = None;
    let mut acc = None;

    if let Some(offset) = find_cell(payload, GPS_FIXED_LEN) {
        if offset >= GPS_FIXED_LEN + 2 {
            altitude = Some(be_u16(&payload[GPS_FIXED_LEN..GPS_FIXED_LEN + 2]) as i16);
        }
        let block = &payload[offset..offset + CELL_LEN];
        cell = Some(CellTower {
            mcc: be_u16(&block[0..2]),
            mnc: block[2],
            lac: be_u16(&block[3..5]),
            cell_id: u32::from_be_bytes([0, block[5], block[6], block[7]]),
        });
        if protocol == ACC_PROTOCOL {
            acc = payload.get(offset + CELL_LEN).map(|b| *b != 0);
        }
    }

    Ok(GpsFix {
        gps_time,
        latitude,
        longitude,
        speed,
        course: word & COURSE_MASK,
        altitude,
        satellites: info & 0x0F,
        gps_info_len: info >> 4,
        real_time: word & REAL_TIME_BIT != 0,
        positioned: word & POSITIONED_BIT != 0,
        north,
        west,
        cell,
        acc,
    })
}

/// First offset at or after `from` holding a plausible cell block
fn find_cell(payload: &[u8], from: usize) -> Option<usize> {
    (from..payload.len().saturating_sub(CELL_LEN - 1)).find(|&offset| {
        let mcc = be_u16(&payload[offset..offset + 2]);
        (100..=999).contains(&mcc)
    })
}

fn decode_datetime(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(2000 + i32::from(bytes[0]), u32::from(bytes[1]), u32::from(bytes[2]))?;
    let time = date.and_hms_opt(u32::from(bytes[3]), u32::from(bytes[4]), u32::from(bytes[5]))?;
    Some(time.and_utc())
}

pub fn decode_status(payload: &[u8]) -> FrameResult<StatusInfo> {
    require(0x13, payload, 3)?;
    Ok(StatusInfo {
        terminal: TerminalInfo::from_byte(payload[0]),
        voltage: VoltageLevel::from_byte(payload[1]),
        gsm: GsmSignal::from_byte(payload[2]),
    })
}

fn decode_alarm(payload: &[u8]) -> FrameResult<PacketBody> {
    require(0x16, payload, 1)?;
    let flags = AlarmFlags::from_byte(payload[0]);
    // An alarm without a usable position is still an alarm
    let fix = decode_gps(0x16, &payload[1..]).ok();
    Ok(PacketBody::Alarm { flags, fix })
}

/// Decode a command reply.
///
/// 0x15: `cmdLen(1) flag(4) text(cmdLen - 4) [language(2)]`
/// 0x21: `flag(4) encoding(1) text`
pub fn decode_command_reply(protocol: u8, payload: &[u8]) -> FrameResult<CommandReply> {
    if protocol == 0x21 {
        require(protocol, payload, 5)?;
        let server_flag = be_u32(&payload[0..4]);
        let text = match payload[4] {
            0x02 => decode_utf16be(&payload[5..]),
            _ => ascii_text(&payload[5..]),
        };
        return Ok(CommandReply { server_flag, text });
    }

    require(protocol, payload, 5)?;
    let cmd_len = usize::from(payload[0]);
    if cmd_len < 4 {
        return Err(FrameError::PayloadTruncated {
            protocol,
            need: 4,
            got: cmd_len,
        });
    }
    let server_flag = be_u32(&payload[1..5]);
    let end = (1 + cmd_len).min(payload.len());
    Ok(CommandReply {
        server_flag,
        text: ascii_text(&payload[5..end]),
    })
}

fn ascii_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()
}

fn decode_utf16be(bytes: &[u8]) -> String {
    let units = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect::<String>()
        .trim_end_matches('\0')
        .to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{Datelike, Timelike};
    use pretty_assertions::assert_eq;

    use super::*;

    /// GPS body: 2024-03-15 10:20:30, 9 satellites, given raw coordinates
    pub(crate) fn gps_payload(raw_lat: u32, raw_lon: u32, speed: u8, word: u16) -> Vec<u8> {
        let mut p = vec![24, 3, 15, 10, 20, 30, 0xC9];
        p.extend_from_slice(&raw_lat.to_be_bytes());
        p.extend_from_slice(&raw_lon.to_be_bytes());
        p.push(speed);
        p.extend_from_slice(&word.to_be_bytes());
        p
    }

    fn cell_block() -> Vec<u8> {
        // MCC 429, MNC 1, LAC 0x1234, cell 0x00ABCD
        vec![0x01, 0xAD, 0x01, 0x12, 0x34, 0x00, 0xAB, 0xCD]
    }

    #[test]
    fn latitude_scaling() {
        let fix = decode_gps(0x12, &gps_payload(0x0220_3070, 0x0900_0000, 0, NORTH_BIT)).unwrap();
        assert_eq!(fix.latitude, f64::from(0x0220_3070u32) / 1_800_000.0);
        assert!((fix.latitude - 19.813_324).abs() < 1e-6);
    }

    #[test]
    fn gps_fields() {
        let word = NORTH_BIT | POSITIONED_BIT | REAL_TIME_BIT | 270;
        let fix = decode_gps(0x12, &gps_payload(0x0220_3070, 0x0900_0000, 42, word)).unwrap();

        assert_eq!(fix.satellites, 9);
        assert_eq!(fix.gps_info_len, 12);
        assert_eq!(fix.speed, 42);
        assert_eq!(fix.course, 270);
        assert!(fix.positioned);
        assert!(fix.real_time);
        let time = fix.gps_time.unwrap();
        assert_eq!((time.year(), time.month(), time.day()), (2024, 3, 15));
        assert_eq!((time.hour(), time.minute(), time.second()), (10, 20, 30));
    }

    #[test]
    fn hemisphere_signing() {
        let fix = decode_gps(0x12, &gps_payload(1_800_000, 3_600_000, 0, WEST_BIT)).unwrap();
        assert_eq!(fix.latitude, -1.0);
        assert_eq!(fix.longitude, -2.0);

        let fix = decode_gps(0x12, &gps_payload(1_800_000, 3_600_000, 0, NORTH_BIT)).unwrap();
        assert_eq!(fix.position(), Some((1.0, 2.0)));
    }

    #[test]
    fn cell_without_altitude() {
        let mut payload = gps_payload(1, 1, 0, NORTH_BIT);
        payload.extend(cell_block());

        let fix = decode_gps(0x12, &payload).unwrap();
        assert_eq!(fix.altitude, None);
        assert_eq!(
            fix.cell,
            Some(CellTower {
                mcc: 429,
                mnc: 1,
                lac: 0x1234,
                cell_id: 0xABCD
            })
        );
    }

    #[test]
    fn altitude_before_cell() {
        let mut payload = gps_payload(1, 1, 0, NORTH_BIT);
        payload.extend_from_slice(&1500u16.to_be_bytes());
        payload.extend(cell_block());

        let fix = decode_gps(0x12, &payload).unwrap();
        assert_eq!(fix.altitude, Some(1500));
        assert_eq!(fix.cell.map(|c| c.mcc), Some(429));
    }

    #[test]
    fn acc_byte_on_0x22() {
        let mut payload = gps_payload(1, 1, 0, NORTH_BIT);
        payload.extend(cell_block());
        payload.push(0x01);

        assert_eq!(decode_gps(0x22, &payload).unwrap().acc, Some(true));
        assert_eq!(decode_gps(0x12, &payload).unwrap().acc, None);
    }

    #[test]
    fn truncated_gps() {
        let err = decode_gps(0x12, &[0; 10]).unwrap_err();
        assert_eq!(
            err,
            FrameError::PayloadTruncated {
                protocol: 0x12,
                need: 18,
                got: 10
            }
        );
    }

    #[test]
    fn login_with_timezone() {
        // terminal 0358899051234567, type 0x1001, GMT+5:45
        let mut payload = vec![0x03, 0x58, 0x89, 0x90, 0x51, 0x23, 0x45, 0x67, 0x10, 0x01];
        payload.extend_from_slice(&((545u16 << 4).to_be_bytes()));

        let login = decode_login(&payload).unwrap();
        assert_eq!(login.terminal_id, "0358899051234567");
        assert_eq!(login.imei(), "358899051234567");
        assert_eq!(login.device_type, Some(0x1001));
        assert_eq!(login.timezone_offset_minutes, Some(345));
    }

    #[test]
    fn western_timezone() {
        assert_eq!(decode_timezone((500 << 4) | 0x08), -300);
    }

    #[test]
    fn command_reply_0x15() {
        let text = b"DYD=Success!";
        let mut payload = vec![(4 + text.len()) as u8, 0, 0, 0, 7];
        payload.extend_from_slice(text);
        payload.extend_from_slice(&[0x00, 0x02]);

        let reply = decode_command_reply(0x15, &payload).unwrap();
        assert_eq!(reply.server_flag, 7);
        assert_eq!(reply.text, "DYD=Success!");
    }

    #[test]
    fn command_reply_0x21() {
        let mut payload = vec![0, 0, 1, 0, 0x01];
        payload.extend_from_slice(b"HFYD=Success!");
        let reply = decode_command_reply(0x21, &payload).unwrap();
        assert_eq!(reply.server_flag, 256);
        assert_eq!(reply.text, "HFYD=Success!");

        let mut payload = vec![0, 0, 0, 1, 0x02];
        payload.extend_from_slice(&[0x00, 0x4F, 0x00, 0x4B]);
        assert_eq!(decode_command_reply(0x21, &payload).unwrap().text, "OK");
    }

    #[test]
    fn alarm_carries_fix() {
        let mut payload = vec![0x01];
        payload.extend(gps_payload(1_800_000, 1_800_000, 0, NORTH_BIT));

        match decode_body(Protocol::Alarm, &payload).unwrap() {
            PacketBody::Alarm { flags, fix } => {
                assert!(flags.emergency);
                assert_eq!(fix.unwrap().latitude, 1.0);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }
}
