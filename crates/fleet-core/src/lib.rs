//! fleet-core - Core types and collaborator traits for the GT06 fleet server
//!
//! The session subsystem talks to the rest of the platform (device registry,
//! record storage, alerting, real-time broadcast) only through the traits in
//! [`collaborators`]. The [`memory`] module provides in-process
//! implementations used by the daemon and by tests.

pub mod collaborators;
pub mod error;
pub mod memory;
pub mod models;

pub use collaborators::{DeviceRegistry, EventPublisher, NotificationGate, RecordStore};
pub use error::{CollaboratorError, CollaboratorResult};
pub use models::*;
