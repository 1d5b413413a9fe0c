//! Server-to-device command frames (protocol 0x80)

use serde::{Deserialize, Serialize};

use crate::ack::crc_itu;
use crate::error::{FrameError, FrameResult};
use crate::frame::{START_STANDARD, STOP};

pub const COMMAND_PROTOCOL: u8 = 0x80;

/// Language field sent with commands (English)
pub const LANGUAGE_ENGLISH: u16 = 0x0002;

/// Longest command text that fits a 1-byte length field
pub const MAX_COMMAND_LEN: usize = 255 - 8 - 4;

/// Checksum written into command frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandChecksum {
    /// 16-bit wrapping sum of the bytes from length through serial
    #[default]
    Additive,
    /// CRC-ITU, as in device-originated frames
    CrcItu,
}

impl CommandChecksum {
    fn compute(self, bytes: &[u8]) -> u16 {
        match self {
            CommandChecksum::Additive => bytes.iter().fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b))),
            CommandChecksum::CrcItu => crc_itu(bytes),
        }
    }
}

/// Build an online command frame.
///
/// ```text
/// 78 78 len 80 cmdLen flag(4) text lang(2) serial(2) checksum(2) 0D 0A
/// ```
pub fn encode_command(
    server_flag: u32,
    command: &str,
    serial: u16,
    checksum: CommandChecksum,
) -> FrameResult<Vec<u8>> {
    let text = command.as_bytes();
    if text.len() > MAX_COMMAND_LEN {
        return Err(FrameError::CommandTooLong(text.len()));
    }

    let cmd_len = 4 + text.len();
    let length = cmd_len + 8;

    let mut frame = Vec::with_capacity(length + 5);
    frame.extend_from_slice(&START_STANDARD);
    frame.push(length as u8);
    frame.push(COMMAND_PROTOCOL);
    frame.push(cmd_len as u8);
    frame.extend_from_slice(&server_flag.to_be_bytes());
    frame.extend_from_slice(text);
    frame.extend_from_slice(&LANGUAGE_ENGLISH.to_be_bytes());
    frame.extend_from_slice(&serial.to_be_bytes());
    let sum = checksum.compute(&frame[2..]);
    frame.extend_from_slice(&sum.to_be_bytes());
    frame.extend_from_slice(&STOP);

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn cut_oil_frame_layout() {
        let frame = encode_command(1, "DYD#", 1, CommandChecksum::Additive).unwrap();

        assert_eq!(frame.len(), 21);
        assert_eq!(&frame[..5], &[0x78, 0x78, 0x10, 0x80, 0x08]);
        assert_eq!(&frame[5..9], &[0, 0, 0, 1]);
        assert_eq!(&frame[9..13], b"DYD#");
        assert_eq!(&frame[13..15], &[0x00, 0x02]);
        assert_eq!(&frame[15..17], &[0x00, 0x01]);
        assert_eq!(&frame[19..], &[0x0D, 0x0A]);

        let expected: u16 = frame[2..17].iter().map(|b| u16::from(*b)).sum();
        assert_eq!(u16::from_be_bytes([frame[17], frame[18]]), expected);
    }

    #[test]
    fn crc_checksum_option() {
        let frame = encode_command(2, "HFYD#", 9, CommandChecksum::CrcItu).unwrap();
        let n = frame.len();
        assert_eq!(u16::from_be_bytes([frame[n - 4], frame[n - 3]]), crc_itu(&frame[2..n - 4]));
    }

    #[test]
    fn rejects_oversized_command() {
        let long = "X".repeat(MAX_COMMAND_LEN + 1);
        assert_eq!(
            encode_command(1, &long, 1, CommandChecksum::Additive),
            Err(FrameError::CommandTooLong(MAX_COMMAND_LEN + 1))
        );
    }
}
