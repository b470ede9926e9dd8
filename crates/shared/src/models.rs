//! Wire data model for chat messages, notifications and read receipts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Chat ---

/// A direct chat message between two users.
///
/// Messages carry no server id; identity is the value of
/// `{sender_id, receiver_id, content, timestamp}` (see [`MessageKey`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

/// Value identity of a [`ChatMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Build an unread message stamped with the current time.
    pub fn new(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            is_read: false,
        }
    }

    pub fn key(&self) -> MessageKey {
        MessageKey {
            sender_id: self.sender_id.clone(),
            receiver_id: self.receiver_id.clone(),
            content: self.content.clone(),
            timestamp: self.timestamp,
        }
    }

    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(&self.sender_id, &self.receiver_id)
    }

    /// The other party of the conversation, seen from `self_id`.
    pub fn partner_of(&self, self_id: &str) -> &str {
        if self.sender_id == self_id {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }
}

/// Unordered pair of participants identifying one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey {
    low: String,
    high: String,
}

impl ConversationKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                low: a.to_string(),
                high: b.to_string(),
            }
        } else {
            Self {
                low: b.to_string(),
                high: a.to_string(),
            }
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.low == user_id || self.high == user_id
    }

    pub fn participants(&self) -> (&str, &str) {
        (&self.low, &self.high)
    }
}

// --- Notifications ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Message,
    FriendRequest,
    ApplicationAccepted,
    Warning,
    Error,
    #[default]
    #[serde(other)]
    Other,
}

/// A server-assigned notification. `id` is its sole identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub notification_type: NotificationType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

// --- Read state ---

/// Body of the "mark conversation read" frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarkMessagesRead {
    pub sender_id: String,
}

/// Body of the best-effort "notification read" frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarkNotificationRead {
    pub notification_id: String,
}

/// A read-state change relayed by the server, typically from another session
/// of the same user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReadReceipt {
    /// Every inbound message from `partner_id` has been read.
    #[serde(rename_all = "camelCase")]
    Messages { partner_id: String },
    /// One notification has been read.
    #[serde(rename_all = "camelCase")]
    Notification { notification_id: String },
}
