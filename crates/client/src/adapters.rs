//! Read-only projections that UI surfaces render.
//!
//! Adapters never hold their own copy of stream state. Each function takes a
//! published view and derives what one widget needs: the bell badge, the
//! notification dropdown, the conversation list and the chat thread.

use chrono::{DateTime, Utc};
use hirewire_shared::{ChatMessage, Notification};

use crate::stores::{MessageView, NotificationView};
use crate::ws::{ConnectionState, ConnectionStatus};

/// Badges cap out at this many.
const BADGE_CAP: usize = 99;

/// Text for an unread badge; empty when there is nothing unread.
pub fn badge_label(unread: usize) -> String {
    match unread {
        0 => String::new(),
        n if n > BADGE_CAP => format!("{}+", BADGE_CAP),
        n => n.to_string(),
    }
}

/// The `limit` newest notifications, newest first.
pub fn dropdown(view: &NotificationView, limit: usize) -> Vec<&Notification> {
    view.items.iter().rev().take(limit).collect()
}

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub partner_id: String,
    pub last_message: String,
    pub last_timestamp: DateTime<Utc>,
    /// Whether the last message was sent by the current user.
    pub last_from_self: bool,
    pub unread: usize,
}

/// Every conversation the current user takes part in, most recent first.
pub fn conversation_list(view: &MessageView, self_id: &str) -> Vec<ConversationSummary> {
    let mut rows: Vec<ConversationSummary> = Vec::new();
    for message in view.items.iter().rev() {
        if message.sender_id != self_id && message.receiver_id != self_id {
            continue;
        }
        let partner = message.partner_of(self_id);
        let inbound_unread = !message.is_read && message.receiver_id == self_id;

        match rows.iter_mut().find(|r| r.partner_id == partner) {
            Some(row) => {
                if inbound_unread {
                    row.unread += 1;
                }
            }
            None => rows.push(ConversationSummary {
                partner_id: partner.to_string(),
                last_message: message.content.clone(),
                last_timestamp: message.timestamp,
                last_from_self: message.sender_id == self_id,
                unread: usize::from(inbound_unread),
            }),
        }
    }
    rows
}

/// The thread between `self_id` and `partner_id`, oldest first.
pub fn chat_thread<'a>(
    view: &'a MessageView,
    self_id: &str,
    partner_id: &str,
) -> Vec<&'a ChatMessage> {
    view.conversation(self_id, partner_id)
}

/// Non-blocking connection indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIndicator {
    pub connected: bool,
    pub label: &'static str,
    /// Last transport error, for a tooltip.
    pub detail: Option<String>,
}

pub fn connection_indicator(status: &ConnectionStatus) -> ConnectionIndicator {
    let label = match status.state {
        ConnectionState::Connected => "Live",
        ConnectionState::Connecting => "Connecting…",
        ConnectionState::Disconnected => "Offline",
        ConnectionState::Error => "Reconnecting",
    };
    ConnectionIndicator {
        connected: status.is_connected(),
        label,
        detail: status.last_error.clone(),
    }
}
