//! Chat message stream and its published view.
//!
//! One merged stream holds every conversation. Per-conversation threads are a
//! projection computed on read, never a second stored copy.

use chrono::{DateTime, Utc};
use hirewire_shared::{ChatMessage, ConversationKey, MessageKey};

use super::stream::{MergedStream, StreamItem};

impl StreamItem for ChatMessage {
    type Key = MessageKey;

    fn key(&self) -> MessageKey {
        ChatMessage::key(self)
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn sender_id(&self) -> &str {
        &self.sender_id
    }

    fn receiver_id(&self) -> &str {
        &self.receiver_id
    }

    fn is_read(&self) -> bool {
        self.is_read
    }

    fn mark_read(&mut self) {
        self.is_read = true;
    }
}

pub type MessageStream = MergedStream<ChatMessage>;

/// Snapshot of the message stream handed to observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageView {
    pub self_id: String,
    /// All messages, ordered by timestamp ascending.
    pub items: Vec<ChatMessage>,
    /// Inbound unread messages across all conversations.
    pub unread_count: usize,
    pub hydrated: bool,
    /// Set when the last conversation fetch failed.
    pub error: Option<String>,
}

impl MessageView {
    pub(crate) fn from_stream(self_id: &str, stream: &MessageStream) -> Self {
        Self {
            self_id: self_id.to_string(),
            items: stream.iter().cloned().collect(),
            unread_count: stream.unread_count(self_id),
            hydrated: stream.is_hydrated(),
            error: stream.error().map(str::to_string),
        }
    }

    /// Messages exchanged between `a` and `b`, in timestamp order.
    pub fn conversation(&self, a: &str, b: &str) -> Vec<&ChatMessage> {
        let key = ConversationKey::new(a, b);
        self.items
            .iter()
            .filter(|m| m.conversation() == key)
            .collect()
    }

    /// Unread messages from `partner_id` to the current user.
    pub fn unread_from(&self, partner_id: &str) -> usize {
        self.items
            .iter()
            .filter(|m| !m.is_read && m.sender_id == partner_id && m.receiver_id == self.self_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn msg(from: &str, to: &str, content: &str, ts: i64) -> ChatMessage {
        ChatMessage {
            sender_id: from.into(),
            receiver_id: to.into(),
            content: content.into(),
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            is_read: false,
        }
    }

    fn view(items: Vec<ChatMessage>) -> MessageView {
        let mut stream = MessageStream::new();
        stream.apply_snapshot(items, |_| true);
        MessageView::from_stream("a", &stream)
    }

    #[test]
    fn test_conversation_partition() {
        let v = view(vec![
            msg("a", "b", "1", 1),
            msg("c", "a", "2", 2),
            msg("b", "a", "3", 3),
            msg("a", "c", "4", 4),
            msg("a", "b", "5", 5),
        ]);
        let ab: Vec<&str> = v.conversation("a", "b").iter().map(|m| m.content.as_str()).collect();
        assert_eq!(ab, vec!["1", "3", "5"]);
        let ca: Vec<&str> = v.conversation("c", "a").iter().map(|m| m.content.as_str()).collect();
        assert_eq!(ca, vec!["2", "4"]);
    }

    #[test]
    fn test_identical_value_is_one_message() {
        let v = view(vec![msg("b", "a", "hi", 1), msg("b", "a", "hi", 1), msg("b", "a", "hi", 2)]);
        assert_eq!(v.items.len(), 2);
        assert_eq!(v.unread_count, 2);
        assert_eq!(v.unread_from("b"), 2);
    }
}
