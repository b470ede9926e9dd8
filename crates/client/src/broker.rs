//! Capability broker: one real-time session per signed-in user, reachable
//! from any part of the UI.
//!
//! The [`Broker`] is an explicitly constructed, cloneable context object. The
//! application creates it once, calls [`Broker::start`] after login and
//! [`Broker::stop`] on logout. Every capability called while no session is
//! active fails with [`RealtimeError::NotInitialized`].

use std::sync::{Arc, PoisonError, RwLock};

use hirewire_shared::{ChatMessage, Notification};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::api_client::RealtimeApi;
use crate::auth_session::SessionProvider;
use crate::config::RealtimeConfig;
use crate::dispatch::OutboundDispatch;
use crate::error::RealtimeError;
use crate::stores::{spawn_reconciler, MessageView, NotificationView, ReconcilerHandle, StreamInput};
use crate::ws::{ConnectionStatus, WsConnection, WsManager};

/// Everything one authenticated session owns: exactly one connection, one
/// multiplexer registration and one reconciler.
pub struct RealtimeSession {
    user_id: String,
    connection: WsConnection,
    streams: ReconcilerHandle,
    dispatch: OutboundDispatch,
    api: Arc<dyn RealtimeApi>,
    reconciler_task: JoinHandle<()>,
}

impl RealtimeSession {
    /// Wire up and connect a session for the currently signed-in user.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: RealtimeConfig,
        session: Arc<dyn SessionProvider>,
        api: Arc<dyn RealtimeApi>,
    ) -> Result<Self, RealtimeError> {
        config.validate()?;
        let auth = session.current().ok_or(RealtimeError::NoSession)?;

        let (streams, reconciler_task) = spawn_reconciler(auth.user_id.clone());
        let connection = WsConnection::new(config.clone(), session);
        WsManager::attach(&connection, config.destinations.clone(), streams.clone());
        let dispatch = OutboundDispatch::new(
            connection.handle(),
            api.clone(),
            config.destinations,
            streams.clone(),
        );
        connection.connect();
        tracing::info!(user = %auth.user_id, "realtime session started");

        Ok(Self {
            user_id: auth.user_id,
            connection,
            streams,
            dispatch,
            api,
            reconciler_task,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn dispatch(&self) -> &OutboundDispatch {
        &self.dispatch
    }

    pub fn streams(&self) -> &ReconcilerHandle {
        &self.streams
    }

    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.status()
    }

    /// Disconnect and stop the reconciler. Late fetch results are discarded.
    pub async fn shutdown(&self) {
        self.connection.disconnect().await;
        self.reconciler_task.abort();
        tracing::info!(user = %self.user_id, "realtime session stopped");
    }
}

/// Process-wide access point to the active [`RealtimeSession`].
#[derive(Clone, Default)]
pub struct Broker {
    active: Arc<RwLock<Option<Arc<RealtimeSession>>>>,
    lifecycle: Arc<Mutex<()>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session for the signed-in user.
    ///
    /// Re-entrant: if a session for the same user is already active it is
    /// returned as-is, so remounting UI never opens a second connection. A
    /// session for a different user is shut down first.
    pub async fn start(
        &self,
        config: RealtimeConfig,
        session: Arc<dyn SessionProvider>,
        api: Arc<dyn RealtimeApi>,
    ) -> Result<Arc<RealtimeSession>, RealtimeError> {
        let _guard = self.lifecycle.lock().await;
        let user_id = session.current().ok_or(RealtimeError::NoSession)?.user_id;

        let previous = self.current();
        if let Some(active) = previous {
            if active.user_id == user_id {
                tracing::debug!(user = %user_id, "session already active");
                return Ok(active);
            }
            tracing::info!(from = %active.user_id, to = %user_id, "switching realtime session");
            self.slot_take();
            active.shutdown().await;
        }

        let started = Arc::new(RealtimeSession::start(config, session, api)?);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(started.clone());
        Ok(started)
    }

    /// Tear down the active session, if any.
    pub async fn stop(&self) {
        let _guard = self.lifecycle.lock().await;
        if let Some(active) = self.slot_take() {
            active.shutdown().await;
        }
    }

    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }

    fn current(&self) -> Option<Arc<RealtimeSession>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn slot_take(&self) -> Option<Arc<RealtimeSession>> {
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// The active session, or `NotInitialized`.
    pub fn session(&self) -> Result<Arc<RealtimeSession>, RealtimeError> {
        self.current().ok_or(RealtimeError::NotInitialized)
    }

    pub fn send_message(&self, message: &ChatMessage) -> Result<(), RealtimeError> {
        self.session()?.dispatch.send_message(message)
    }

    pub fn send_notify(&self, notification: &Notification) -> Result<(), RealtimeError> {
        self.session()?.dispatch.send_notify(notification)
    }

    pub fn mark_messages_as_read(&self, sender_id: &str) -> Result<(), RealtimeError> {
        self.session()?.dispatch.mark_messages_as_read(sender_id)
    }

    pub async fn mark_notification_as_read(
        &self,
        notification_id: &str,
    ) -> Result<(), RealtimeError> {
        let session = self.session()?;
        session
            .dispatch
            .mark_notification_as_read(notification_id)
            .await
    }

    /// Insert a message the caller has just sent into the local stream.
    pub fn record_sent_message(&self, message: ChatMessage) -> Result<(), RealtimeError> {
        self.session()?
            .streams
            .push(StreamInput::MessageSent(message));
        Ok(())
    }

    /// Fetch the notification snapshot.
    pub async fn refresh_notifications(&self) -> Result<(), RealtimeError> {
        let session = self.session()?;
        session
            .streams
            .refresh_notifications(session.api.as_ref())
            .await;
        Ok(())
    }

    /// Fetch the history of the conversation with `partner_id`.
    pub async fn open_conversation(&self, partner_id: &str) -> Result<(), RealtimeError> {
        let session = self.session()?;
        session
            .streams
            .refresh_conversation(session.api.as_ref(), partner_id)
            .await;
        Ok(())
    }

    pub fn notifications(&self) -> Result<watch::Receiver<NotificationView>, RealtimeError> {
        Ok(self.session()?.streams.notifications())
    }

    pub fn messages(&self) -> Result<watch::Receiver<MessageView>, RealtimeError> {
        Ok(self.session()?.streams.messages())
    }

    pub fn connection_status(&self) -> Result<watch::Receiver<ConnectionStatus>, RealtimeError> {
        Ok(self.session()?.connection_status())
    }
}
