//! Destination table for the pub/sub protocol.

use serde::{Deserialize, Serialize};

/// Server pushes chat messages addressed to the connected user here.
pub const MESSAGES_QUEUE: &str = "/user/queue/messages";
/// Server pushes notifications addressed to the connected user here.
pub const NOTIFICATIONS_QUEUE: &str = "/user/queue/notifications";
/// Server relays read-state changes made by the user's other sessions here.
pub const READ_QUEUE: &str = "/user/queue/read";

pub const SEND_DESTINATION: &str = "/app/chat.send";
pub const NOTIFY_DESTINATION: &str = "/app/notify";
pub const READ_MESSAGES_DESTINATION: &str = "/app/chat.read";
pub const READ_NOTIFICATION_DESTINATION: &str = "/app/notifications.read";

/// Named destinations used by one session. Every field can be overridden
/// through configuration; missing fields fall back to the defaults above.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Destinations {
    pub messages: String,
    pub notifications: String,
    pub read_receipts: String,
    pub send: String,
    pub notify: String,
    pub read_messages: String,
    pub read_notification: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Self {
            messages: MESSAGES_QUEUE.to_string(),
            notifications: NOTIFICATIONS_QUEUE.to_string(),
            read_receipts: READ_QUEUE.to_string(),
            send: SEND_DESTINATION.to_string(),
            notify: NOTIFY_DESTINATION.to_string(),
            read_messages: READ_MESSAGES_DESTINATION.to_string(),
            read_notification: READ_NOTIFICATION_DESTINATION.to_string(),
        }
    }
}

/// Check if a host is a local/development address.
pub fn is_local_address(host: &str) -> bool {
    let host_part = host.split(':').next().unwrap_or(host);
    host_part == "localhost"
        || host_part == "127.0.0.1"
        || host_part == "0.0.0.0"
        || host_part.starts_with("192.168.")
        || host_part.starts_with("10.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_override_keeps_defaults() {
        let d: Destinations = serde_json::from_str(r#"{"send":"/app/dm"}"#).unwrap();
        assert_eq!(d.send, "/app/dm");
        assert_eq!(d.messages, MESSAGES_QUEUE);
        assert_eq!(d.read_notification, READ_NOTIFICATION_DESTINATION);
    }

    #[test]
    fn test_is_local_address() {
        assert!(is_local_address("localhost:8080"));
        assert!(is_local_address("10.0.0.4"));
        assert!(!is_local_address("jobs.example.com"));
    }
}
