//! Shared types for the hirewire real-time client.
//!
//! Wire payloads, the STOMP frame codec and the destination table live here so
//! that both the client core and test servers speak the same protocol.

pub mod error;
pub mod frame;
pub mod models;
pub mod protocol;

pub use error::*;
pub use frame::*;
pub use models::*;
pub use protocol::*;
