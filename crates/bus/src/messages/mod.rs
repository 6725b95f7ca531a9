//! Payload types and topic names carried on the bus.
//!
//! - **Event messages** (`events`): completion events, side-effect requests, health
//! - **Topic constants** (`topics`): canonical topic strings for routing

pub mod events;
pub mod topics;

pub use events::*;
