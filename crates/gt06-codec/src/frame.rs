//! Stream framing

use bytes::{Buf, BytesMut};
use chrono::Utc;
use tracing::{debug, trace, warn};

use crate::ack::crc_itu;
use crate::decode::decode_body;
use crate::error::{FrameError, FrameResult};
use crate::packet::TelemetryPacket;
use crate::protocol::Protocol;

/// Start marker of standard frames (1-byte length)
pub const START_STANDARD: [u8; 2] = [0x78, 0x78];
/// Start marker of extended frames (2-byte length)
pub const START_EXTENDED: [u8; 2] = [0x79, 0x79];
pub const STOP: [u8; 2] = [0x0D, 0x0A];

/// Smallest complete frame: start, length, protocol, serial, crc, stop
pub const MIN_FRAME_LEN: usize = 10;

/// Upper bound on bytes held while waiting for a frame to complete
pub const MAX_BUFFERED_BYTES: usize = 4 * 1024;

/// Incremental decoder for one connection.
///
/// Bytes that do not yet form a complete frame stay buffered until the next
/// call, so frames split across reads decode once the rest arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
        }
    }

    /// Bytes currently held
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append `bytes` and decode every complete frame now available
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<TelemetryPacket> {
        if self.buffer.len() + bytes.len() > MAX_BUFFERED_BYTES {
            warn!(
                buffered = self.buffer.len(),
                incoming = bytes.len(),
                "Frame buffer overflow, discarding buffered bytes"
            );
            self.buffer.clear();
        }
        self.buffer.extend_from_slice(bytes);

        let mut packets = Vec::new();
        while self.buffer.len() >= 5 {
            let Some(start) = find_start(&self.buffer) else {
                // Keep a trailing marker byte that may be completed by the next read
                let keep = matches!(self.buffer.last(), Some(0x78 | 0x79));
                let discard = self.buffer.len() - usize::from(keep);
                trace!(discarded = discard, "No start marker, discarding bytes");
                self.buffer.advance(discard);
                break;
            };
            if start > 0 {
                debug!(skipped = start, "Skipping bytes before start marker");
                self.buffer.advance(start);
            }

            let total = match frame_len(&self.buffer) {
                Ok(Some(total)) => total,
                // Need more bytes for the length field
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "Invalid frame length, resynchronising");
                    self.buffer.advance(2);
                    continue;
                }
            };
            if total > MAX_BUFFERED_BYTES {
                debug!(total, "Frame longer than buffer limit, resynchronising");
                self.buffer.advance(2);
                continue;
            }
            if self.buffer.len() < total {
                break;
            }

            match decode_frame(&self.buffer[..total]) {
                Ok(packet) => {
                    self.buffer.advance(total);
                    packets.push(packet);
                }
                Err(FrameError::BadStopMarker(a, b)) => {
                    debug!(stop = %format!("{:02X}{:02X}", a, b), "Bad stop marker, resynchronising");
                    self.buffer.advance(2);
                }
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable frame");
                    self.buffer.advance(total);
                }
            }
        }
        packets
    }
}

fn find_start(buf: &[u8]) -> Option<usize> {
    buf.windows(2)
        .position(|w| w == START_STANDARD || w == START_EXTENDED)
}

/// Header size (start marker + length field) for a frame starting at `buf[0]`
fn header_len(buf: &[u8]) -> usize {
    if buf[..2] == START_EXTENDED {
        4
    } else {
        3
    }
}

/// Total frame length, or `None` while the length field is incomplete
fn frame_len(buf: &[u8]) -> FrameResult<Option<usize>> {
    let header = header_len(buf);
    if buf.len() < header {
        return Ok(None);
    }
    let declared = if header == 4 {
        usize::from(u16::from_be_bytes([buf[2], buf[3]]))
    } else {
        usize::from(buf[2])
    };
    // protocol(1) serial(2) crc(2)
    if declared < 5 {
        return Err(FrameError::InvalidLength(declared));
    }
    Ok(Some(header + declared + 2))
}

/// Decode exactly one complete frame
pub fn decode_frame(frame: &[u8]) -> FrameResult<TelemetryPacket> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort {
            need: MIN_FRAME_LEN,
            got: frame.len(),
        });
    }
    if frame[..2] != START_STANDARD && frame[..2] != START_EXTENDED {
        return Err(FrameError::BadStartMarker(frame[0], frame[1]));
    }

    let header = header_len(frame);
    let total = frame_len(frame)?.ok_or(FrameError::TooShort {
        need: header,
        got: frame.len(),
    })?;
    if frame.len() < total {
        return Err(FrameError::TooShort {
            need: total,
            got: frame.len(),
        });
    }
    let frame = &frame[..total];

    let stop = &frame[total - 2..];
    if stop != STOP {
        return Err(FrameError::BadStopMarker(stop[0], stop[1]));
    }

    let protocol = Protocol::from(frame[header]);
    let payload = &frame[header + 1..total - 6];
    let serial = u16::from_be_bytes([frame[total - 6], frame[total - 5]]);
    let checksum = u16::from_be_bytes([frame[total - 4], frame[total - 3]]);
    let checksum_valid = crc_itu(&frame[2..total - 4]) == checksum;
    if !checksum_valid {
        debug!(protocol = %protocol, serial, checksum, "Checksum mismatch");
    }

    let body = decode_body(protocol, payload)?;

    Ok(TelemetryPacket {
        raw: hex::encode_upper(frame),
        received_at: Utc::now(),
        length: total - header - 2,
        protocol,
        serial,
        checksum,
        checksum_valid,
        needs_ack: protocol.needs_ack(),
        body,
    })
}

/// Build a frame around `payload` with a valid CRC.
///
/// Payloads too long for a 1-byte length are wrapped in an extended frame.
/// Used to simulate devices.
pub fn encode_frame(protocol: u8, payload: &[u8], serial: u16) -> Vec<u8> {
    let declared = payload.len() + 5;
    let mut frame = Vec::with_capacity(declared + 6);
    if declared <= usize::from(u8::MAX) {
        frame.extend_from_slice(&START_STANDARD);
        frame.push(declared as u8);
    } else {
        frame.extend_from_slice(&START_EXTENDED);
        frame.extend_from_slice(&(declared as u16).to_be_bytes());
    }
    frame.push(protocol);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&serial.to_be_bytes());
    let crc = crc_itu(&frame[2..]);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame.extend_from_slice(&STOP);
    frame
}
