//! Shared fixtures: an in-process STOMP-over-WebSocket broker and an
//! in-memory REST collaborator.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use hirewire_client::{RealtimeApi, RealtimeConfig, ReconnectConfig};
use hirewire_shared::{ApiError, ChatMessage, Command, Frame, Notification, NotificationType};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub const TOKEN: &str = "secret-token";

/// Fail the test instead of hanging.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

pub fn config(endpoint: &str) -> RealtimeConfig {
    RealtimeConfig {
        endpoint: endpoint.to_string(),
        reconnect: ReconnectConfig {
            reconnect_delay_ms: 50,
        },
        handshake_timeout_ms: 2_000,
        ..Default::default()
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn notification(id: &str, receiver: &str, secs: i64) -> Notification {
    Notification {
        id: id.to_string(),
        sender_id: "recruiter".to_string(),
        receiver_id: receiver.to_string(),
        title: format!("title {id}"),
        content: "content".to_string(),
        notification_type: NotificationType::ApplicationAccepted,
        timestamp: at(secs),
        is_read: false,
    }
}

pub fn message(from: &str, to: &str, content: &str, secs: i64) -> ChatMessage {
    ChatMessage {
        sender_id: from.to_string(),
        receiver_id: to.to_string(),
        content: content.to_string(),
        timestamp: at(secs),
        is_read: false,
    }
}

enum Control {
    Push { destination: String, body: String },
    Kick,
}

/// Minimal STOMP broker: accepts CONNECT carrying the expected bearer token,
/// records every client frame and pushes MESSAGE frames on request.
pub struct MockBroker {
    pub url: String,
    received: mpsc::UnboundedReceiver<Frame>,
    current: Arc<Mutex<Option<mpsc::UnboundedSender<Control>>>>,
    connections: Arc<AtomicUsize>,
}

impl MockBroker {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let (received_tx, received) = mpsc::unbounded_channel();
        let current = Arc::new(Mutex::new(None));
        let connections = Arc::new(AtomicUsize::new(0));

        let slot = current.clone();
        let count = connections.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                count.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, received_tx.clone(), slot.clone()));
            }
        });

        Self {
            url,
            received,
            current,
            connections,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Next frame the client sent.
    pub async fn next_frame(&mut self) -> Frame {
        within(self.received.recv()).await.expect("broker stopped")
    }

    /// Skip frames until one with `command` arrives.
    pub async fn expect(&mut self, command: Command) -> Frame {
        loop {
            let frame = self.next_frame().await;
            if frame.command == command {
                return frame;
            }
        }
    }

    /// Wait for the CONNECT and the three queue subscriptions.
    pub async fn expect_session(&mut self) -> Vec<String> {
        self.expect(Command::Connect).await;
        let mut destinations = Vec::new();
        for _ in 0..3 {
            let frame = self.expect(Command::Subscribe).await;
            destinations.push(frame.destination().unwrap_or_default().to_string());
        }
        destinations
    }

    pub fn push(&self, destination: &str, body: impl Into<String>) {
        self.control(Control::Push {
            destination: destination.to_string(),
            body: body.into(),
        });
    }

    pub fn push_json<T: serde::Serialize>(&self, destination: &str, payload: &T) {
        self.push(destination, serde_json::to_string(payload).unwrap());
    }

    /// Drop the current client connection from the server side.
    pub fn kick(&self) {
        self.control(Control::Kick);
    }

    fn control(&self, control: Control) {
        let current = self.current.lock().unwrap();
        let sender = current.as_ref().expect("no client connected");
        let _ = sender.send(control);
    }
}

async fn serve(
    stream: TcpStream,
    received: mpsc::UnboundedSender<Frame>,
    current: Arc<Mutex<Option<mpsc::UnboundedSender<Control>>>>,
) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    // Handshake.
    loop {
        let Some(Ok(Message::Text(text))) = ws.next().await else {
            return;
        };
        let Ok(Some(frame)) = Frame::decode(text.as_str()) else {
            continue;
        };
        if frame.command != Command::Connect {
            continue;
        }
        let expected = format!("Bearer {TOKEN}");
        let authorized = frame.get("Authorization") == Some(expected.as_str());
        let _ = received.send(frame);
        if !authorized {
            let error = Frame::new(Command::Error).header("message", "invalid token");
            let _ = ws.send(Message::text(error.encode())).await;
            let _ = ws.close(None).await;
            return;
        }
        let connected = Frame::new(Command::Connected).header("version", "1.2");
        if ws.send(Message::text(connected.encode())).await.is_err() {
            return;
        }
        break;
    }

    let (control_tx, mut control) = mpsc::unbounded_channel();
    *current.lock().unwrap() = Some(control_tx);
    let mut subscriptions: HashMap<String, String> = HashMap::new();
    let mut next_id = 0u64;

    loop {
        tokio::select! {
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(Some(frame)) = Frame::decode(text.as_str()) {
                        if frame.command == Command::Subscribe {
                            if let (Some(id), Some(dest)) = (frame.get("id"), frame.destination()) {
                                subscriptions.insert(dest.to_string(), id.to_string());
                            }
                        }
                        let _ = received.send(frame);
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
            command = control.recv() => match command {
                Some(Control::Push { destination, body }) => {
                    next_id += 1;
                    let subscription = subscriptions.get(&destination).cloned().unwrap_or_default();
                    let frame = Frame::message(&destination, &subscription, &next_id.to_string(), &body);
                    if ws.send(Message::text(frame.encode())).await.is_err() {
                        return;
                    }
                }
                Some(Control::Kick) | None => {
                    let _ = ws.close(None).await;
                    return;
                }
            },
        }
    }
}

/// In-memory REST collaborator.
#[derive(Default)]
pub struct MemoryApi {
    pub notifications: Mutex<Vec<Notification>>,
    pub messages: Mutex<Vec<ChatMessage>>,
    pub marked: Mutex<Vec<String>>,
    pub fail_mark_read: Mutex<bool>,
}

#[async_trait]
impl RealtimeApi for MemoryApi {
    async fn fetch_conversation(&self, partner_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        Ok(self
            .messages
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
        if *self.fail_mark_read.lock().unwrap() {
            return Err(ApiError::Http {
                status: 503,
                body: String::new(),
            });
        }
        self.marked.lock().unwrap().push(notification_id.to_string());
        if let Some(n) = self
            .notifications
            .lock()
            .unwrap()
            .iter_mut()
            .find(|n| n.id == notification_id)
        {
            n.is_read = true;
        }
        Ok(())
    }
}
