//! Outbound actions encoded as frames for their server-side destinations.
//!
//! Sends are fire-and-forget: a queued frame is not acknowledged, and while the
//! transport is down every action fails fast with `NotConnected` instead of
//! being buffered. Marking a notification read is the exception: its REST call
//! is authoritative and is awaited.

use std::sync::Arc;

use hirewire_shared::{
    ChatMessage, Destinations, MarkMessagesRead, MarkNotificationRead, Notification,
};

use crate::api_client::RealtimeApi;
use crate::error::RealtimeError;
use crate::stores::{ReconcilerHandle, StreamInput};
use crate::ws::WsHandle;

#[derive(Clone)]
pub struct OutboundDispatch {
    ws: WsHandle,
    api: Arc<dyn RealtimeApi>,
    destinations: Destinations,
    streams: ReconcilerHandle,
}

impl OutboundDispatch {
    pub fn new(
        ws: WsHandle,
        api: Arc<dyn RealtimeApi>,
        destinations: Destinations,
        streams: ReconcilerHandle,
    ) -> Self {
        Self {
            ws,
            api,
            destinations,
            streams,
        }
    }

    /// Publish a chat message. Any optimistic insertion is up to the caller
    /// (see [`StreamInput::MessageSent`]).
    pub fn send_message(&self, message: &ChatMessage) -> Result<(), RealtimeError> {
        if message.content.trim().is_empty() {
            return Err(RealtimeError::EmptyMessage);
        }
        self.ws.publish(&self.destinations.send, message)
    }

    pub fn send_notify(&self, notification: &Notification) -> Result<(), RealtimeError> {
        self.ws.publish(&self.destinations.notify, notification)
    }

    /// Mark every inbound message from `sender_id` read, on the server and in
    /// the local stream. Nothing changes locally if the frame was not queued.
    pub fn mark_messages_as_read(&self, sender_id: &str) -> Result<(), RealtimeError> {
        self.ws.publish(
            &self.destinations.read_messages,
            &MarkMessagesRead {
                sender_id: sender_id.to_string(),
            },
        )?;
        self.streams.push(StreamInput::ConversationRead {
            partner_id: sender_id.to_string(),
        });
        Ok(())
    }

    /// Persist a notification's read state over REST, then hint other
    /// sessions over the socket.
    ///
    /// The local entry turns read only after the REST call succeeds. On failure
    /// the error is returned and recorded on the notification view; the entry
    /// stays unread until a later success or snapshot says otherwise.
    pub async fn mark_notification_as_read(
        &self,
        notification_id: &str,
    ) -> Result<(), RealtimeError> {
        let id = notification_id.to_string();
        self.streams
            .push(StreamInput::NotificationReadStarted(id.clone()));

        if let Err(e) = self.api.mark_notification_read(notification_id).await {
            tracing::warn!(notification = %notification_id, "mark read failed: {}", e);
            self.streams.push(StreamInput::NotificationReadFailed {
                id,
                error: e.user_message(),
            });
            return Err(e.into());
        }
        self.streams
            .push(StreamInput::NotificationReadCommitted(id.clone()));

        let hint = self.ws.publish(
            &self.destinations.read_notification,
            &MarkNotificationRead {
                notification_id: id,
            },
        );
        if let Err(e) = hint {
            tracing::debug!(notification = %notification_id, "read hint not sent: {}", e);
        }
        Ok(())
    }
}
