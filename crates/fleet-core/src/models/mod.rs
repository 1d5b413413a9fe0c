//! Shared data models for the fleet server

mod control;
mod event;
mod record;
mod state;
mod vehicle;

pub use control::*;
pub use event::*;
pub use record::*;
pub use state::*;
pub use vehicle::*;
