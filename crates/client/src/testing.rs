//! In-memory REST fake for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use hirewire_shared::{ApiError, ChatMessage, Notification};

use crate::api_client::RealtimeApi;

#[derive(Default)]
pub(crate) struct FakeApi {
    pub notifications: Mutex<Vec<Notification>>,
    pub conversations: Mutex<Vec<ChatMessage>>,
    pub fail_mark_read: Mutex<Option<ApiError>>,
    pub marked: Mutex<Vec<String>>,
}

#[async_trait]
impl RealtimeApi for FakeApi {
    async fn fetch_conversation(&self, partner_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.sender_id == partner_id || m.receiver_id == partner_id)
            .cloned()
            .collect())
    }

    async fn fetch_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        Ok(self.notifications.lock().unwrap().clone())
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<(), ApiError> {
        if let Some(e) = self.fail_mark_read.lock().unwrap().clone() {
            return Err(e);
        }
        self.marked.lock().unwrap().push(notification_id.to_string());
        Ok(())
    }
}
