//! End-to-end session behaviour: broker, multiplexer, reconciler and dispatch
//! against an in-process broker and an in-memory REST collaborator.

mod common;

use std::sync::Arc;

use common::{config, message, notification, within, MemoryApi, MockBroker, TOKEN};
use hirewire_client::adapters::{badge_label, chat_thread, conversation_list};
use hirewire_client::{AuthSession, Broker, RealtimeError, StaticSession};
use hirewire_shared::{
    ChatMessage, Command, MarkMessagesRead, MarkNotificationRead, Notification, ReadReceipt,
    MESSAGES_QUEUE, NOTIFICATIONS_QUEUE, NOTIFY_DESTINATION, READ_MESSAGES_DESTINATION,
    READ_NOTIFICATION_DESTINATION, READ_QUEUE, SEND_DESTINATION,
};

struct Harness {
    server: MockBroker,
    api: Arc<MemoryApi>,
    broker: Broker,
}

/// Start a session for `u1` and wait until all queues are subscribed.
async fn signed_in(api: MemoryApi) -> Harness {
    let mut server = MockBroker::start().await;
    let api = Arc::new(api);
    let broker = Broker::new();
    broker
        .start(
            config(&server.url),
            Arc::new(StaticSession(AuthSession::new("u1", TOKEN))),
            api.clone(),
        )
        .await
        .unwrap();
    let subscribed = server.expect_session().await;
    assert_eq!(subscribed, vec![MESSAGES_QUEUE, NOTIFICATIONS_QUEUE, READ_QUEUE]);
    Harness {
        server,
        api,
        broker,
    }
}

#[tokio::test]
async fn test_pushed_notification_marked_read() {
    let mut h = signed_in(MemoryApi::default()).await;
    h.broker.refresh_notifications().await.unwrap();

    h.server
        .push_json(NOTIFICATIONS_QUEUE, &notification("n1", "u1", 1));
    let mut view = h.broker.notifications().unwrap();
    within(view.wait_for(|v| v.unread_count == 1)).await.unwrap();
    assert_eq!(badge_label(view.borrow().unread_count), "1");

    h.broker.mark_notification_as_read("n1").await.unwrap();
    let current = within(view.wait_for(|v| v.unread_count == 0))
        .await
        .unwrap()
        .clone();
    assert!(current.get("n1").unwrap().is_read);
    assert_eq!(h.api.marked.lock().unwrap().as_slice(), ["n1"]);

    let hint = h.server.expect(Command::Send).await;
    assert_eq!(hint.destination(), Some(READ_NOTIFICATION_DESTINATION));
    assert_eq!(
        hint.json_body::<MarkNotificationRead>()
            .unwrap()
            .notification_id,
        "n1"
    );

    h.broker.stop().await;
}

#[tokio::test]
async fn test_duplicate_push_yields_one_entry() {
    let h = signed_in(MemoryApi::default()).await;
    h.broker.refresh_notifications().await.unwrap();

    let n2 = notification("n2", "u1", 2);
    h.server.push_json(NOTIFICATIONS_QUEUE, &n2);
    h.server.push_json(NOTIFICATIONS_QUEUE, &n2);
    h.server
        .push_json(NOTIFICATIONS_QUEUE, &notification("n3", "u1", 3));

    let mut view = h.broker.notifications().unwrap();
    let current = within(view.wait_for(|v| v.get("n3").is_some()))
        .await
        .unwrap()
        .clone();
    let ids: Vec<&str> = current.items.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["n2", "n3"]);

    h.broker.stop().await;
}

#[tokio::test]
async fn test_live_push_before_snapshot_is_kept() {
    let api = MemoryApi::default();
    api.notifications
        .lock()
        .unwrap()
        .extend([notification("n1", "u1", 10), notification("n2", "u1", 30)]);
    let h = signed_in(api).await;

    h.server
        .push_json(NOTIFICATIONS_QUEUE, &notification("n3", "u1", 20));
    h.broker.refresh_notifications().await.unwrap();

    let mut view = h.broker.notifications().unwrap();
    let current = within(view.wait_for(|v| v.hydrated && v.items.len() == 3))
        .await
        .unwrap()
        .clone();
    let ids: Vec<&str> = current.items.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["n1", "n3", "n2"]);
    assert_eq!(current.unread_count, 3);

    h.broker.stop().await;
}

#[tokio::test]
async fn test_read_receipt_before_entry_is_honoured() {
    let api = MemoryApi::default();
    let mut read_elsewhere = notification("n5", "u1", 5);
    api.notifications.lock().unwrap().push(read_elsewhere.clone());
    let h = signed_in(api).await;

    // Another session read n5 before this one fetched it; the snapshot is stale.
    h.server.push_json(
        READ_QUEUE,
        &ReadReceipt::Notification {
            notification_id: "n5".into(),
        },
    );
    h.broker.refresh_notifications().await.unwrap();

    let mut view = h.broker.notifications().unwrap();
    let current = within(view.wait_for(|v| v.get("n5").is_some_and(|n| n.is_read)))
        .await
        .unwrap()
        .clone();
    assert!(current.hydrated);
    assert_eq!(current.unread_count, 0);

    // A later stale push cannot flip it back.
    read_elsewhere.content = "edited".into();
    h.server.push_json(NOTIFICATIONS_QUEUE, &read_elsewhere);
    let current = within(view.wait_for(|v| v.get("n5").is_some_and(|n| n.content == "edited")))
        .await
        .unwrap()
        .clone();
    assert!(current.get("n5").unwrap().is_read);

    h.broker.stop().await;
}

#[tokio::test]
async fn test_conversations_partition_and_mark_read() {
    let api = MemoryApi::default();
    api.messages.lock().unwrap().extend([
        message("u2", "u1", "hi from b", 1),
        message("u1", "u2", "hi b", 3),
    ]);
    let mut h = signed_in(api).await;
    h.broker.open_conversation("u2").await.unwrap();

    h.server
        .push_json(MESSAGES_QUEUE, &message("u3", "u1", "hi from c", 2));
    h.server
        .push_json(MESSAGES_QUEUE, &message("u2", "u1", "you there?", 4));

    let mut view = h.broker.messages().unwrap();
    let current = within(view.wait_for(|v| v.items.len() == 4))
        .await
        .unwrap()
        .clone();

    let thread: Vec<&str> = chat_thread(&current, "u1", "u2")
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(thread, vec!["hi from b", "hi b", "you there?"]);
    let rows = conversation_list(&current, "u1");
    assert_eq!(rows[0].partner_id, "u2");
    assert_eq!(rows[0].unread, 2);
    assert_eq!(rows[1].partner_id, "u3");
    assert_eq!(current.unread_count, 3);

    h.broker.mark_messages_as_read("u2").unwrap();
    let read = h.server.expect(Command::Send).await;
    assert_eq!(read.destination(), Some(READ_MESSAGES_DESTINATION));
    assert_eq!(read.json_body::<MarkMessagesRead>().unwrap().sender_id, "u2");

    let current = within(view.wait_for(|v| v.unread_count == 1))
        .await
        .unwrap()
        .clone();
    assert_eq!(current.unread_from("u3"), 1);
    assert_eq!(current.unread_from("u2"), 0);

    h.broker.stop().await;
}

#[tokio::test]
async fn test_send_message_reaches_server() {
    let mut h = signed_in(MemoryApi::default()).await;
    let outgoing = ChatMessage::new("u1", "u2", "Hello");
    h.broker.send_message(&outgoing).unwrap();
    h.broker.record_sent_message(outgoing.clone()).unwrap();

    let sent = h.server.expect(Command::Send).await;
    assert_eq!(sent.destination(), Some(SEND_DESTINATION));
    assert_eq!(sent.json_body::<ChatMessage>().unwrap(), outgoing);

    h.broker.stop().await;
    assert!(matches!(
        h.broker.send_message(&outgoing),
        Err(RealtimeError::NotInitialized)
    ));
}

#[tokio::test]
async fn test_send_notify_reaches_server() {
    let mut h = signed_in(MemoryApi::default()).await;
    let outgoing = notification("n8", "u2", 8);
    h.broker.send_notify(&outgoing).unwrap();

    let sent = h.server.expect(Command::Send).await;
    assert_eq!(sent.destination(), Some(NOTIFY_DESTINATION));
    assert_eq!(sent.json_body::<Notification>().unwrap(), outgoing);
    assert!(sent.body.contains(r#""type":"application_accepted""#));

    h.broker.stop().await;
    assert!(matches!(
        h.broker.send_notify(&outgoing),
        Err(RealtimeError::NotInitialized)
    ));
}

#[tokio::test]
async fn test_session_survives_reconnect() {
    let mut h = signed_in(MemoryApi::default()).await;
    h.broker.refresh_notifications().await.unwrap();

    h.server.kick();
    h.server.expect_session().await;

    h.server
        .push_json(NOTIFICATIONS_QUEUE, &notification("n7", "u1", 7));
    let mut view = h.broker.notifications().unwrap();
    within(view.wait_for(|v| v.get("n7").is_some()))
        .await
        .unwrap();
    assert_eq!(h.server.connections(), 2);

    h.broker.stop().await;
}
