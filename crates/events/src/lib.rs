//! Event system for the build pipeline
//!
//! Stages publish progress here; front ends subscribe to render it.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
