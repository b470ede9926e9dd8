//! WebSocket transport speaking STOMP to the real-time broker.
//!
//! This module provides:
//! - One connection per session with fixed-delay auto-reconnect
//! - A cheap [`WsHandle`] for publishing and subscribing
//! - The [`WsManager`] that subscribes the per-user queues on every connect
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────┐  frames   ┌──────────────┐  StreamInput  ┌──────────────┐
//!   │ WsConnection │ ────────▶ │  WsManager   │ ────────────▶ │  Reconciler  │
//!   │ (loop task)  │           │ (decode)     │               │ (one task)   │
//!   └──────────────┘           └──────────────┘               └──────────────┘
//!          ▲                                                         │
//!          │ publish                                      watch views│
//!   ┌──────────────┐                                                 ▼
//!   │   Dispatch   │ ◀──────────────── actions ─────────────── observers
//!   └──────────────┘
//! ```
//!
//! Subscriptions belong to one connection lifetime. The manager re-registers
//! them from an on-connect callback, so a reconnect restores every stream.

pub(crate) mod connection;
pub mod manager;

pub use connection::{
    ConnectCallback, ConnectionState, ConnectionStatus, FrameHandler, ReconnectConfig,
    WsConnection, WsHandle,
};
pub use manager::WsManager;
