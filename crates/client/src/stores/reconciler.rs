//! The single writer of both merged streams.
//!
//! Every state change (pushed frame, REST snapshot, local action) is sent as a
//! [`StreamInput`] to one task that owns the [`Reconciler`]. After each change
//! the task publishes fresh views over `watch` channels, so any number of
//! observers read the same state and nothing else ever writes to it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use hirewire_shared::{ApiError, ChatMessage, ConversationKey, Notification, ReadReceipt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::messages::{MessageStream, MessageView};
use super::notifications::{NotificationStream, NotificationView};
use crate::api_client::RealtimeApi;

/// Everything that can change stream state.
#[derive(Debug, Clone)]
pub enum StreamInput {
    /// Chat message pushed by the server.
    LiveMessage(ChatMessage),
    /// Notification pushed by the server.
    LiveNotification(Notification),
    /// Read-state change relayed from another session.
    ReadReceipt(ReadReceipt),
    /// A message this client just sent, inserted optimistically.
    MessageSent(ChatMessage),
    /// The user read the conversation with `partner_id` in this session.
    ConversationRead { partner_id: String },
    NotificationsSnapshot {
        generation: u64,
        result: Result<Vec<Notification>, ApiError>,
    },
    ConversationSnapshot {
        partner_id: String,
        generation: u64,
        result: Result<Vec<ChatMessage>, ApiError>,
    },
    /// A mark-as-read REST call started.
    NotificationReadStarted(String),
    /// The REST call succeeded; the read state is committed.
    NotificationReadCommitted(String),
    /// The REST call failed; nothing was committed.
    NotificationReadFailed { id: String, error: String },
}

/// Which views an input touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changed {
    pub messages: bool,
    pub notifications: bool,
}

impl Changed {
    const MESSAGES: Changed = Changed {
        messages: true,
        notifications: false,
    };
    const NOTIFICATIONS: Changed = Changed {
        messages: false,
        notifications: true,
    };
}

/// Both streams for one signed-in user.
#[derive(Debug)]
pub struct Reconciler {
    self_id: String,
    messages: MessageStream,
    notifications: NotificationStream,
    read_in_flight: BTreeSet<String>,
    read_errors: BTreeMap<String, String>,
}

impl Reconciler {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            messages: MessageStream::new(),
            notifications: NotificationStream::new(),
            read_in_flight: BTreeSet::new(),
            read_errors: BTreeMap::new(),
        }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn apply(&mut self, input: StreamInput) -> Changed {
        match input {
            StreamInput::LiveMessage(message) | StreamInput::MessageSent(message) => {
                self.messages.push_live(message);
                Changed::MESSAGES
            }
            StreamInput::LiveNotification(notification) => {
                self.notifications.push_live(notification);
                Changed::NOTIFICATIONS
            }
            StreamInput::ReadReceipt(ReadReceipt::Messages { partner_id })
            | StreamInput::ConversationRead { partner_id } => {
                self.read_conversation(&partner_id);
                Changed::MESSAGES
            }
            StreamInput::ReadReceipt(ReadReceipt::Notification { notification_id }) => {
                self.notifications.mark_read(&notification_id);
                Changed::NOTIFICATIONS
            }
            StreamInput::NotificationsSnapshot { result, .. } => {
                match result {
                    Ok(items) => self.notifications.replace_all(items),
                    Err(e) => {
                        tracing::warn!("notification snapshot failed: {}", e);
                        self.notifications.fail(e.user_message());
                    }
                }
                Changed::NOTIFICATIONS
            }
            StreamInput::ConversationSnapshot {
                partner_id, result, ..
            } => {
                match result {
                    Ok(items) => {
                        let scope = ConversationKey::new(&self.self_id, &partner_id);
                        self.messages
                            .apply_snapshot(items, |m| m.conversation() == scope);
                    }
                    Err(e) => {
                        tracing::warn!(partner = %partner_id, "conversation snapshot failed: {}", e);
                        self.messages.fail(e.user_message());
                    }
                }
                Changed::MESSAGES
            }
            StreamInput::NotificationReadStarted(id) => {
                self.read_errors.remove(&id);
                self.read_in_flight.insert(id);
                Changed::NOTIFICATIONS
            }
            StreamInput::NotificationReadCommitted(id) => {
                self.read_in_flight.remove(&id);
                self.read_errors.remove(&id);
                self.notifications.mark_read(&id);
                Changed::NOTIFICATIONS
            }
            StreamInput::NotificationReadFailed { id, error } => {
                self.read_in_flight.remove(&id);
                self.read_errors.insert(id, error);
                Changed::NOTIFICATIONS
            }
        }
    }

    /// Everything `partner_id` sent up to their newest known message is
    /// read, including history that has not been fetched yet.
    fn read_conversation(&mut self, partner_id: &str) {
        let upto = self
            .messages
            .latest_from(partner_id)
            .unwrap_or_else(Utc::now);
        let changed = self.messages.read_through(partner_id, upto);
        tracing::debug!(partner = %partner_id, changed, "conversation marked read");
    }

    pub fn messages(&self) -> &MessageStream {
        &self.messages
    }

    pub fn notifications(&self) -> &NotificationStream {
        &self.notifications
    }

    pub fn message_view(&self) -> MessageView {
        MessageView::from_stream(&self.self_id, &self.messages)
    }

    pub fn notification_view(&self) -> NotificationView {
        NotificationView {
            items: self.notifications.iter().cloned().collect(),
            unread_count: self.notifications.unread_count(&self.self_id),
            hydrated: self.notifications.is_hydrated(),
            error: self.notifications.error().map(str::to_string),
            read_in_flight: self.read_in_flight.iter().cloned().collect(),
            read_errors: self.read_errors.clone(),
        }
    }
}

/// Latest issued fetch ticket per stream; older results are stale.
#[derive(Debug, Default)]
struct Generations {
    notifications: AtomicU64,
    conversations: Mutex<HashMap<String, u64>>,
}

impl Generations {
    fn next_notifications(&self) -> u64 {
        self.notifications.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_conversation(&self, partner_id: &str) -> u64 {
        let mut map = self
            .conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let generation = map.entry(partner_id.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn is_stale(&self, input: &StreamInput) -> bool {
        match input {
            StreamInput::NotificationsSnapshot { generation, .. } => {
                *generation != self.notifications.load(Ordering::SeqCst)
            }
            StreamInput::ConversationSnapshot {
                partner_id,
                generation,
                ..
            } => {
                let map = self
                    .conversations
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                map.get(partner_id) != Some(generation)
            }
            _ => false,
        }
    }
}

/// Cloneable access to the reconciler task.
#[derive(Clone)]
pub struct ReconcilerHandle {
    input: mpsc::UnboundedSender<StreamInput>,
    messages: watch::Receiver<MessageView>,
    notifications: watch::Receiver<NotificationView>,
    generations: Arc<Generations>,
}

impl ReconcilerHandle {
    /// Queue an input. Returns false once the session has shut down.
    pub fn push(&self, input: StreamInput) -> bool {
        if self.input.send(input).is_err() {
            tracing::debug!("reconciler stopped, dropping input");
            return false;
        }
        true
    }

    pub fn messages(&self) -> watch::Receiver<MessageView> {
        self.messages.clone()
    }

    pub fn notifications(&self) -> watch::Receiver<NotificationView> {
        self.notifications.clone()
    }

    pub fn message_view(&self) -> MessageView {
        self.messages.borrow().clone()
    }

    pub fn notification_view(&self) -> NotificationView {
        self.notifications.borrow().clone()
    }

    /// Take a ticket for a notification fetch, invalidating older tickets.
    pub fn begin_notifications_fetch(&self) -> u64 {
        self.generations.next_notifications()
    }

    /// Take a ticket for a conversation fetch, invalidating older tickets for
    /// the same partner.
    pub fn begin_conversation_fetch(&self, partner_id: &str) -> u64 {
        self.generations.next_conversation(partner_id)
    }

    /// Fetch the notification snapshot and hand it to the reconciler.
    pub async fn refresh_notifications(&self, api: &dyn RealtimeApi) {
        let generation = self.begin_notifications_fetch();
        let result = api.fetch_notifications().await;
        self.push(StreamInput::NotificationsSnapshot { generation, result });
    }

    /// Fetch one conversation's history and hand it to the reconciler.
    pub async fn refresh_conversation(&self, api: &dyn RealtimeApi, partner_id: &str) {
        let generation = self.begin_conversation_fetch(partner_id);
        let result = api.fetch_conversation(partner_id).await;
        self.push(StreamInput::ConversationSnapshot {
            partner_id: partner_id.to_string(),
            generation,
            result,
        });
    }
}

/// Start the reconciler task for `self_id`.
///
/// The task ends when every [`ReconcilerHandle`] has been dropped.
pub fn spawn_reconciler(self_id: impl Into<String>) -> (ReconcilerHandle, JoinHandle<()>) {
    let mut reconciler = Reconciler::new(self_id);
    let (input, mut rx) = mpsc::unbounded_channel();
    let (messages_tx, messages) = watch::channel(reconciler.message_view());
    let (notifications_tx, notifications) = watch::channel(reconciler.notification_view());
    let generations = Arc::new(Generations::default());

    let handle = ReconcilerHandle {
        input,
        messages,
        notifications,
        generations: generations.clone(),
    };

    let task = tokio::spawn(async move {
        while let Some(input) = rx.recv().await {
            if generations.is_stale(&input) {
                tracing::debug!("dropping stale snapshot result");
                continue;
            }
            let changed = reconciler.apply(input);
            if changed.messages {
                messages_tx.send_replace(reconciler.message_view());
            }
            if changed.notifications {
                notifications_tx.send_replace(reconciler.notification_view());
            }
        }
        tracing::debug!(user = %reconciler.self_id(), "reconciler stopped");
    });

    (handle, task)
}
