//! Notification stream and its published view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hirewire_shared::Notification;

use super::stream::{MergedStream, StreamItem};

impl StreamItem for Notification {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
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

pub type NotificationStream = MergedStream<Notification>;

/// Snapshot of the notification stream handed to observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationView {
    /// Ordered by timestamp ascending.
    pub items: Vec<Notification>,
    pub unread_count: usize,
    pub hydrated: bool,
    /// Set when the last snapshot fetch failed.
    pub error: Option<String>,
    /// Ids whose read state is being persisted right now.
    pub read_in_flight: Vec<String>,
    /// Rejected mark-as-read calls, by notification id.
    pub read_errors: BTreeMap<String, String>,
}

impl NotificationView {
    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn is_read_in_flight(&self, id: &str) -> bool {
        self.read_in_flight.iter().any(|i| i == id)
    }

    /// Why the last attempt to mark `id` read failed, if it did.
    pub fn read_error(&self, id: &str) -> Option<&str> {
        self.read_errors.get(id).map(String::as_str)
    }
}
