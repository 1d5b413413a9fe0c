//! gt06-codec - GT06 tracker wire protocol
//!
//! Turns the raw byte stream of a GT06-family GPS tracker into typed
//! [`TelemetryPacket`]s, and builds the frames the server sends back
//! (acknowledgements and relay commands).
//!
//! # Frame layout
//!
//! ```text
//! ┌────────┬────────┬──────────┬─────────┬────────┬─────────┬────────┐
//! │ start  │ length │ protocol │ payload │ serial │ CRC-ITU │ stop   │
//! │ 78 78  │ 1 byte │ 1 byte   │ len - 5 │ 2      │ 2       │ 0D 0A  │
//! └────────┴────────┴──────────┴─────────┴────────┴─────────┴────────┘
//! ```
//!
//! Extended frames start with `79 79` and carry a 2-byte length.
//!
//! # Example
//!
//! ```rust
//! use gt06_codec::{ack_frame, FrameDecoder, Protocol};
//!
//! let mut decoder = FrameDecoder::new();
//! let frame = gt06_codec::encode_frame(0x13, &[0x46, 0x04, 0x03, 0x00, 0x02], 7);
//! let packets = decoder.decode(&frame);
//!
//! assert_eq!(packets.len(), 1);
//! assert_eq!(packets[0].protocol, Protocol::Status);
//! assert_eq!(ack_frame(0x13, 7).len(), 10);
//! ```

pub mod ack;
pub mod command;
pub mod decode;
pub mod error;
pub mod frame;
pub mod packet;
pub mod protocol;
pub mod status;

pub use ack::{ack_frame, crc_itu, ACK_FRAME_LEN};
pub use command::{encode_command, CommandChecksum, COMMAND_PROTOCOL};
pub use error::{FrameError, FrameResult};
pub use frame::{decode_frame, encode_frame, FrameDecoder, MAX_BUFFERED_BYTES};
pub use packet::{AlarmFlags, CellTower, CommandReply, GpsFix, LoginInfo, PacketBody, StatusInfo, TelemetryPacket};
pub use protocol::Protocol;
pub use status::{AlarmCode, GsmSignal, TerminalInfo, VoltageLevel};
