//! Hirewire Client - real-time messaging and notification core
//!
//! This crate keeps one STOMP-over-WebSocket connection per signed-in user,
//! merges pushed chat messages and notifications with REST snapshots, and
//! exposes the result as observable views plus a small set of actions.

pub mod adapters;
pub mod api_client;
pub mod auth_session;
pub mod broker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod stores;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing;

pub use api_client::{ApiClient, RealtimeApi};
pub use auth_session::{AuthSession, SessionProvider, SessionSlot, StaticSession};
pub use broker::{Broker, RealtimeSession};
pub use config::RealtimeConfig;
pub use dispatch::OutboundDispatch;
pub use error::RealtimeError;
pub use stores::{MessageView, NotificationView, StreamInput};
pub use ws::{ConnectionState, ConnectionStatus, ReconnectConfig};
