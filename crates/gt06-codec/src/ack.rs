//! Acknowledgement frames

use crc::{Crc, CRC_16_IBM_SDLC};

/// CRC-ITU (X.25): seed 0xFFFF, reflected poly 0x8408, inverted result
const CRC_ITU: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

pub const ACK_FRAME_LEN: usize = 10;

/// CRC-ITU checksum as used by GT06 frames
pub fn crc_itu(bytes: &[u8]) -> u16 {
    CRC_ITU.checksum(bytes)
}

/// Acknowledgement for a packet that requested one
pub fn ack_frame(protocol: u8, serial: u16) -> [u8; ACK_FRAME_LEN] {
    let [serial_hi, serial_lo] = serial.to_be_bytes();
    let mut frame = [0x78, 0x78, 0x05, protocol, serial_hi, serial_lo, 0, 0, 0x0D, 0x0A];
    let [crc_hi, crc_lo] = crc_itu(&frame[2..6]).to_be_bytes();
    frame[6] = crc_hi;
    frame[7] = crc_lo;
    frame
}
