//! Session and control errors

use fleet_core::CollaboratorError;
use gt06_codec::FrameError;
use thiserror::Error;

/// Reasons a device session ends abnormally
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device did not log in within {0}s")]
    LoginTimeout(u64),

    #[error("Device silent for {0}s")]
    IdleTimeout(u64),

    #[error("Unknown device: {0}")]
    Unauthorized(String),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Failures of a control command round trip
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("device {0} is not connected")]
    DeviceOffline(String),

    #[error("connection closed before the device replied")]
    ConnectionClosed,

    #[error("no reply within {0}s")]
    Timeout(u64),

    #[error("failed to build command frame: {0}")]
    Encode(#[from] FrameError),
}
