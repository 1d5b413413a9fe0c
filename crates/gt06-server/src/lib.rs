//! gt06-server - GT06 device sessions and relay control
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  DeviceListener (TCP accept)                                 │
//! │        │ one task per socket                                 │
//! │        ▼                                                     │
//! │  SessionManager ── FrameDecoder ── GpsPipeline               │
//! │        │                              │                      │
//! │        │ login                        ▼                      │
//! │        ▼                     NotificationGate → RecordStore  │
//! │  ConnectionRegistry                   │                      │
//! │   (IMEI → DeviceHandle)               ▼                      │
//! │        ▲                       EventPublisher                │
//! │        │ OutboundCommand                                     │
//! │  ControlClient                 TimeoutMonitor (periodic)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The connection task is the only reader and writer of its socket. The
//! [`ControlClient`] never touches a socket: it queues a command frame on
//! the device's [`DeviceHandle`] and waits for the connection task to
//! resolve the reply.

pub mod alerts;
pub mod config;
pub mod control;
pub mod error;
pub mod geo;
pub mod listener;
pub mod monitor;
pub mod pipeline;
pub mod publisher;
pub mod registry;
pub mod session;

pub use alerts::{Alert, AlertGate, AlertKind, AlertSink, LogAlertSink};
pub use config::{ConfigError, ServerConfig};
pub use control::{classify_reply, ControlClient};
pub use error::{ControlError, SessionError, SessionResult};
pub use listener::DeviceListener;
pub use monitor::TimeoutMonitor;
pub use pipeline::{GpsPipeline, Rejection};
pub use publisher::BroadcastPublisher;
pub use registry::{ConnectionRegistry, DeviceHandle, OnlineDevice, OutboundCommand};
pub use session::{Collaborators, SessionManager, SessionState};
