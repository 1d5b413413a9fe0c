//! Per-connection device sessions
//!
//! One task per accepted socket. The task owns the socket exclusively: it
//! decodes inbound frames, writes acknowledgements, runs telemetry through
//! the GPS pipeline and writes control commands queued through the
//! [`ConnectionRegistry`].

mod connection;
mod telemetry;

use std::sync::Arc;

use fleet_core::{DeviceRegistry, EventPublisher, NotificationGate, RecordStore};

use crate::config::{PipelineConfig, SessionConfig};
use crate::pipeline::GpsPipeline;
use crate::registry::ConnectionRegistry;

pub use connection::READ_BUFFER_SIZE;

/// Lifecycle of a device connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket accepted
    Connected,
    /// Reading, no login seen yet
    AwaitingLogin,
    /// Login accepted and acknowledged
    Authenticated,
    /// Telemetry flowing after login
    Streaming,
    Closed,
}

/// Platform services a session talks to
#[derive(Clone)]
pub struct Collaborators {
    pub devices: Arc<dyn DeviceRegistry>,
    pub records: Arc<dyn RecordStore>,
    pub gate: Arc<dyn NotificationGate>,
    pub publisher: Arc<dyn EventPublisher>,
}

/// Runs device sessions
pub struct SessionManager {
    config: SessionConfig,
    pipeline: GpsPipeline,
    collaborators: Collaborators,
    registry: Arc<ConnectionRegistry>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        pipeline: PipelineConfig,
        collaborators: Collaborators,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            config,
            pipeline: GpsPipeline::new(pipeline),
            collaborators,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}
