//! WebSocket connection loop using tokio-tungstenite.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use futures_util::{SinkExt, StreamExt};
use hirewire_shared::{Command, Frame, HEADER_MESSAGE};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{lock, ConnectionState, ConnectionStatus, Shared, WsHandle};
use crate::auth_session::{AuthSession, SessionProvider};
use crate::config::RealtimeConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Grace period for the loop to send DISCONNECT and close the socket.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Why a connected session ended.
enum Exit {
    Shutdown,
    Lost(String),
}

struct Running {
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// The single managed connection to the broker.
///
/// Owns one socket at a time. The socket is opened by [`connect`], re-opened
/// after failures with a fixed delay, and released by [`disconnect`] or when
/// this value is dropped.
///
/// [`connect`]: WsConnection::connect
/// [`disconnect`]: WsConnection::disconnect
pub struct WsConnection {
    shared: Arc<Shared>,
    config: RealtimeConfig,
    session: Arc<dyn SessionProvider>,
    running: Mutex<Option<Running>>,
}

impl WsConnection {
    pub fn new(config: RealtimeConfig, session: Arc<dyn SessionProvider>) -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            config,
            session,
            running: Mutex::new(None),
        }
    }

    /// Get a handle for sending frames and subscribing
    pub fn handle(&self) -> WsHandle {
        WsHandle::new(self.shared.clone())
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.watch_status()
    }

    /// Run `callback` after every successful handshake, including reconnects.
    pub fn on_connect(&self, callback: impl Fn(&WsHandle) + Send + Sync + 'static) {
        self.shared.add_connect_callback(Arc::new(callback));
    }

    /// Start the connection loop. No-op while a loop is already running
    /// (connecting, connected or waiting to retry).
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut running = lock(&self.running);
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            tracing::debug!("connect ignored: connection loop already running");
            return;
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(connection_loop(
            self.shared.clone(),
            self.config.clone(),
            self.session.clone(),
            shutdown_rx,
        ));
        *running = Some(Running { task, shutdown });
    }

    /// Stop the loop and release the socket. Safe to call at any time,
    /// including when never connected.
    pub async fn disconnect(&self) {
        let running = lock(&self.running).take();
        if let Some(Running { task, shutdown }) = running {
            let _ = shutdown.send(true);
            let abort = task.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                tracing::warn!("connection loop did not stop in time, aborting");
                abort.abort();
            }
        }
        self.shared.close_link();
        self.shared.set_state(ConnectionState::Disconnected, None);
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        if let Some(running) = lock(&self.running).take() {
            running.task.abort();
        }
        self.shared.close_link();
        self.shared.set_state(ConnectionState::Disconnected, None);
    }
}

/// Sleep for `delay` unless shutdown is requested first. Returns true on
/// shutdown.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

async fn connection_loop(
    shared: Arc<Shared>,
    config: RealtimeConfig,
    session: Arc<dyn SessionProvider>,
    mut shutdown: watch::Receiver<bool>,
) {
    let delay = config.reconnect.delay();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let Some(auth) = session.current() else {
            // Not signed in yet; check again after the retry delay.
            shared.set_state(ConnectionState::Disconnected, None);
            if wait_or_shutdown(&mut shutdown, delay).await {
                break;
            }
            continue;
        };

        shared.set_state(ConnectionState::Connecting, None);
        tracing::info!(endpoint = %config.endpoint, "connecting");

        let attempt = tokio::select! {
            res = tokio::time::timeout(config.handshake_timeout(), handshake(&config, &auth)) => {
                res.unwrap_or_else(|_| Err("handshake timed out".to_string()))
            }
            _ = shutdown.changed() => break,
        };

        match attempt {
            Ok(socket) => {
                let (sender, receiver) = unbounded();
                shared.open_link(sender);
                shared.set_state(ConnectionState::Connected, None);
                tracing::info!(endpoint = %config.endpoint, user = %auth.user_id, "connected");

                let handle = WsHandle::new(shared.clone());
                for callback in shared.connect_callbacks() {
                    callback(&handle);
                }

                let exit = pump(socket, receiver, &shared, &mut shutdown).await;
                shared.close_link();
                match exit {
                    Exit::Shutdown => break,
                    Exit::Lost(reason) => {
                        tracing::warn!(endpoint = %config.endpoint, "connection lost: {}", reason);
                        shared.set_state(ConnectionState::Error, Some(reason));
                    }
                }
            }
            Err(reason) => {
                tracing::error!(endpoint = %config.endpoint, "connection failed: {}", reason);
                shared.set_state(ConnectionState::Error, Some(reason));
            }
        }

        tracing::info!("reconnecting in {}ms", delay.as_millis());
        if wait_or_shutdown(&mut shutdown, delay).await {
            break;
        }
    }

    shared.close_link();
    shared.set_state(ConnectionState::Disconnected, None);
    tracing::info!(endpoint = %config.endpoint, "connection loop stopped");
}

/// Open the socket and complete the STOMP CONNECT/CONNECTED exchange.
async fn handshake(config: &RealtimeConfig, auth: &AuthSession) -> Result<Socket, String> {
    let (mut socket, _response) = connect_async(config.endpoint.as_str())
        .await
        .map_err(|e| e.to_string())?;

    let connect = Frame::connect(&config.broker_host(), Some(&auth.access_token));
    socket
        .send(Message::text(connect.encode()))
        .await
        .map_err(|e| e.to_string())?;

    while let Some(msg) = socket.next().await {
        match msg.map_err(|e| e.to_string())? {
            Message::Text(text) => match Frame::decode(text.as_str()) {
                Ok(Some(frame)) if frame.command == Command::Connected => return Ok(socket),
                Ok(Some(frame)) if frame.command == Command::Error => {
                    let reason = frame
                        .get(HEADER_MESSAGE)
                        .map(str::to_string)
                        .unwrap_or(frame.body);
                    return Err(format!("broker rejected connection: {reason}"));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("ignoring undecodable handshake frame: {}", e),
            },
            Message::Close(_) => return Err("closed during handshake".to_string()),
            _ => {}
        }
    }
    Err("closed during handshake".to_string())
}

/// Move frames in both directions until the socket ends or shutdown is
/// requested. Inbound handlers run inline, so they observe wire order.
async fn pump(
    socket: Socket,
    mut outbound: UnboundedReceiver<Frame>,
    shared: &Shared,
    shutdown: &mut watch::Receiver<bool>,
) -> Exit {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_text(shared, text.as_str()),
                Some(Ok(Message::Close(_))) | None => {
                    return Exit::Lost("connection closed by server".to_string())
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Exit::Lost(e.to_string()),
            },
            frame = outbound.next() => match frame {
                Some(frame) => {
                    if let Err(e) = write.send(Message::text(frame.encode())).await {
                        return Exit::Lost(format!("send failed: {e}"));
                    }
                }
                None => return Exit::Lost("outbound queue closed".to_string()),
            },
            _ = shutdown.changed() => {
                let receipt = uuid::Uuid::new_v4().to_string();
                let _ = write.send(Message::text(Frame::disconnect(&receipt).encode())).await;
                let _ = write.close().await;
                return Exit::Shutdown;
            }
        }
    }
}

fn handle_text(shared: &Shared, text: &str) {
    match Frame::decode(text) {
        Ok(Some(frame)) => match frame.command {
            Command::Message => shared.dispatch(&frame),
            Command::Error => tracing::warn!(
                message = ?frame.get(HEADER_MESSAGE),
                body = %frame.body,
                "broker error frame"
            ),
            Command::Receipt => tracing::debug!("receipt {:?}", frame.get("receipt-id")),
            other => tracing::debug!("ignoring {} frame", other),
        },
        Ok(None) => {}
        Err(e) => tracing::warn!("dropping undecodable frame: {}", e),
    }
}
