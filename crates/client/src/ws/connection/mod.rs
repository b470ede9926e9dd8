//! Connection state, reconnect policy and the send/subscribe handle.
//!
//! The connection loop itself lives in `connection_native`; this module holds
//! the state it shares with every [`WsHandle`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_channel::mpsc::UnboundedSender;
use hirewire_shared::{Frame, HEADER_SUBSCRIPTION};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::RealtimeError;

mod connection_native;
pub use connection_native::WsConnection;

/// Lifecycle of the single broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The last attempt failed or the link dropped; a retry is scheduled.
    Error,
}

/// What observers see: the state plus the most recent failure, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state == ConnectionState::Connecting
    }
}

/// Reconnect policy: unbounded retries after a fixed delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconnectConfig {
    pub reconnect_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 5000,
        }
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Invoked once per inbound MESSAGE frame on a subscription, in wire order.
pub type FrameHandler = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Invoked after every successful handshake.
pub type ConnectCallback = Arc<dyn Fn(&WsHandle) + Send + Sync>;

struct Subscription {
    destination: String,
    handler: FrameHandler,
}

/// The live half of a connection. Exists only while CONNECTED, so dropping it
/// on disconnect also drops every subscription.
struct Link {
    sender: UnboundedSender<Frame>,
    subscriptions: HashMap<String, Subscription>,
}

/// State shared between the connection loop and all handles.
pub(crate) struct Shared {
    status: watch::Sender<ConnectionStatus>,
    link: Mutex<Option<Link>>,
    on_connect: Mutex<Vec<ConnectCallback>>,
    next_subscription: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            status: watch::Sender::new(ConnectionStatus::default()),
            link: Mutex::new(None),
            on_connect: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    pub(crate) fn set_state(&self, state: ConnectionState, error: Option<String>) {
        self.status.send_modify(|status| {
            status.state = state;
            if state == ConnectionState::Connected {
                status.last_error = None;
            } else if error.is_some() {
                status.last_error = error;
            }
        });
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub(crate) fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub(crate) fn open_link(&self, sender: UnboundedSender<Frame>) {
        *lock(&self.link) = Some(Link {
            sender,
            subscriptions: HashMap::new(),
        });
    }

    pub(crate) fn close_link(&self) {
        lock(&self.link).take();
    }

    pub(crate) fn add_connect_callback(&self, callback: ConnectCallback) {
        lock(&self.on_connect).push(callback);
    }

    pub(crate) fn connect_callbacks(&self) -> Vec<ConnectCallback> {
        lock(&self.on_connect).clone()
    }

    /// Route a MESSAGE frame to its subscription handler.
    ///
    /// The handler runs outside the lock so it may publish or subscribe.
    pub(crate) fn dispatch(&self, frame: &Frame) {
        let handler = {
            let link = lock(&self.link);
            let Some(link) = link.as_ref() else {
                return;
            };
            let by_id = frame
                .get(HEADER_SUBSCRIPTION)
                .and_then(|id| link.subscriptions.get(id));
            let by_destination = || {
                let destination = frame.destination()?;
                link.subscriptions
                    .values()
                    .find(|s| s.destination == destination)
            };
            by_id.or_else(by_destination).map(|s| s.handler.clone())
        };
        match handler {
            Some(handler) => handler(frame),
            None => tracing::debug!(
                destination = ?frame.destination(),
                "no subscription for inbound frame"
            ),
        }
    }
}

/// Cheap, cloneable access to the connection for sending and subscribing.
#[derive(Clone)]
pub struct WsHandle {
    shared: Arc<Shared>,
}

impl WsHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Queue a raw frame. Fails with `NotConnected` unless CONNECTED; nothing
    /// is buffered for later delivery.
    pub fn send_frame(&self, frame: Frame) -> Result<(), RealtimeError> {
        let link = lock(&self.shared.link);
        let link = link.as_ref().ok_or(RealtimeError::NotConnected)?;
        link.sender
            .unbounded_send(frame)
            .map_err(|_| RealtimeError::NotConnected)
    }

    /// Publish `payload` as JSON to `destination`.
    pub fn publish<T: Serialize>(&self, destination: &str, payload: &T) -> Result<(), RealtimeError> {
        let frame = Frame::send_json(destination, payload)?;
        match self.send_frame(frame) {
            Ok(()) => {
                tracing::debug!(destination, "frame queued");
                Ok(())
            }
            Err(e) => {
                tracing::debug!(destination, "dropping publish: {}", e);
                Err(e)
            }
        }
    }

    /// Register `handler` for frames on `destination`. The subscription lives
    /// until the current connection ends; re-register from an on-connect
    /// callback.
    pub fn subscribe(
        &self,
        destination: &str,
        handler: impl Fn(&Frame) + Send + Sync + 'static,
    ) -> Result<String, RealtimeError> {
        let mut link = lock(&self.shared.link);
        let link = link.as_mut().ok_or(RealtimeError::NotConnected)?;
        let id = format!(
            "sub-{}",
            self.shared.next_subscription.fetch_add(1, Ordering::Relaxed)
        );
        link.sender
            .unbounded_send(Frame::subscribe(&id, destination))
            .map_err(|_| RealtimeError::NotConnected)?;
        link.subscriptions.insert(
            id.clone(),
            Subscription {
                destination: destination.to_string(),
                handler: Arc::new(handler),
            },
        );
        tracing::debug!(destination, id = %id, "subscribed");
        Ok(id)
    }

    pub fn unsubscribe(&self, id: &str) -> Result<(), RealtimeError> {
        let mut link = lock(&self.shared.link);
        let link = link.as_mut().ok_or(RealtimeError::NotConnected)?;
        if link.subscriptions.remove(id).is_some() {
            link.sender
                .unbounded_send(Frame::unsubscribe(id))
                .map_err(|_| RealtimeError::NotConnected)?;
        }
        Ok(())
    }
}
