//! Channel multiplexer: turns the one broker connection into typed streams.
//!
//! On every successful connect the manager subscribes to the per-user
//! message, notification and read-receipt queues. Each inbound frame is
//! decoded and forwarded to the reconciler as a [`StreamInput`]; frames that do
//! not decode are logged and dropped so one bad frame cannot stall the rest.

use hirewire_shared::{ChatMessage, Destinations, Frame, Notification, ReadReceipt};
use serde::de::DeserializeOwned;

use super::connection::{WsConnection, WsHandle};
use crate::stores::{ReconcilerHandle, StreamInput};

/// Stateless wiring between a [`WsConnection`] and a [`ReconcilerHandle`].
pub struct WsManager;

impl WsManager {
    /// Register the subscriptions to be made on each (re)connect.
    pub fn attach(connection: &WsConnection, destinations: Destinations, sink: ReconcilerHandle) {
        connection.on_connect(move |handle| {
            Self::subscribe_all(handle, &destinations, &sink);
        });
    }

    fn subscribe_all(handle: &WsHandle, destinations: &Destinations, sink: &ReconcilerHandle) {
        route::<ChatMessage>(
            handle,
            &destinations.messages,
            sink.clone(),
            StreamInput::LiveMessage,
        );
        route::<Notification>(
            handle,
            &destinations.notifications,
            sink.clone(),
            StreamInput::LiveNotification,
        );
        route::<ReadReceipt>(
            handle,
            &destinations.read_receipts,
            sink.clone(),
            StreamInput::ReadReceipt,
        );
    }
}

/// Subscribe `destination`, decoding each frame body as `T`.
fn route<T>(
    handle: &WsHandle,
    destination: &str,
    sink: ReconcilerHandle,
    wrap: fn(T) -> StreamInput,
) where
    T: DeserializeOwned + 'static,
{
    let name = destination.to_string();
    let result = handle.subscribe(destination, move |frame: &Frame| {
        match frame.json_body::<T>() {
            Ok(payload) => {
                sink.push(wrap(payload));
            }
            Err(e) => tracing::warn!(destination = %name, "dropping malformed frame: {}", e),
        }
    });
    if let Err(e) = result {
        // The link dropped between CONNECTED and now; the next connect retries.
        tracing::warn!(destination, "subscribe failed: {}", e);
    }
}
