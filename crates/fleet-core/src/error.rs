//! Errors returned by external collaborators

use thiserror::Error;

/// Result type for collaborator calls
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Errors a collaborator (registry, store, gate, publisher) can report
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Device registry lookup failed
    #[error("Device registry error: {0}")]
    Registry(String),

    /// Record store read or write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Notification gate refused or failed to deliver
    #[error("Notification error: {0}")]
    Notification(String),

    /// Collaborator is not reachable
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}
