//! WebSocket client for room collaboration.
//!
//! [`SyncChannel`] owns the connection lifecycle (connect, retry, disconnect) and
//! the encoding of [`ClientMessage`]s. The socket itself sits behind the
//! [`Transport`] trait; [`NativeTransport`] is the blocking `tungstenite` client
//! run on a background thread.

use crate::chat::ChatMessage;
use crate::element::DrawingElement;
use crate::protocol::{ClientMessage, CursorPosition, ServerMessage};
use kurbo::Point;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Default room server endpoint.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:3001/ws";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported websocket scheme: {0}")]
    UnsupportedScheme(String),
    #[error("missing join parameter: {0}")]
    MissingParameter(&'static str),
    #[error("not connected")]
    NotConnected,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Retry behaviour after a failed or dropped connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive reconnect attempts before giving up.
    pub max_attempts: u32,
    /// Wait between a failure and the next attempt.
    pub delay: Duration,
    /// Time allowed for the TCP connect and the websocket handshake.
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Client connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Websocket endpoint, without the join query.
    pub server_url: String,
    pub policy: ReconnectPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            policy: ReconnectPolicy::default(),
        }
    }
}

/// Events reported by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The websocket handshake completed.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// The connection was closed after being opened.
    Closed,
    /// The connection could not be established or broke with an error.
    Failed(String),
}

/// A message-oriented socket the channel can drive.
pub trait Transport {
    /// Start connecting to `url`. Completion is reported via [`TransportEvent::Opened`].
    fn open(&mut self, url: &Url, timeout: Duration) -> Result<(), SyncError>;

    /// Queue a text frame.
    fn send(&mut self, text: String) -> Result<(), SyncError>;

    /// Drain pending events without blocking.
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    /// Close the connection, if any.
    fn close(&mut self);
}

/// Client side of a room connection.
pub struct SyncChannel<T: Transport = NativeTransport> {
    transport: T,
    config: SyncConfig,
    state: ConnectionState,
    /// Join URL; `None` after an explicit disconnect.
    url: Option<Url>,
    attempts: u32,
    retry_at: Option<Instant>,
}

impl<T: Transport> SyncChannel<T> {
    pub fn new(transport: T, config: SyncConfig) -> Self {
        Self {
            transport,
            config,
            state: ConnectionState::Disconnected,
            url: None,
            attempts: 0,
            retry_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// When the next reconnect attempt is due, if one is scheduled.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Build the join URL for a room and user.
    pub fn connection_url(&self, room_id: &str, user_id: &str) -> Result<Url, SyncError> {
        if room_id.is_empty() {
            return Err(SyncError::MissingParameter("roomId"));
        }
        if user_id.is_empty() {
            return Err(SyncError::MissingParameter("userId"));
        }
        let mut url = Url::parse(&self.config.server_url)?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(SyncError::UnsupportedScheme(url.scheme().to_string()));
        }
        url.query_pairs_mut()
            .append_pair("roomId", room_id)
            .append_pair("userId", user_id);
        Ok(url)
    }

    /// Connect to a room, replacing any existing connection.
    pub fn connect(&mut self, room_id: &str, user_id: &str) -> Result<(), SyncError> {
        let url = self.connection_url(room_id, user_id)?;
        self.transport.close();
        self.url = Some(url);
        self.attempts = 0;
        self.retry_at = None;
        self.open(Instant::now());
        Ok(())
    }

    /// Close the connection and cancel pending retries.
    pub fn disconnect(&mut self) {
        if self.url.take().is_some() {
            log::info!("disconnecting from room server");
        }
        self.transport.close();
        self.state = ConnectionState::Disconnected;
        self.retry_at = None;
        self.attempts = 0;
    }

    fn open(&mut self, now: Instant) {
        let Some(url) = self.url.clone() else {
            return;
        };
        self.state = ConnectionState::Connecting;
        log::info!("connecting to {url}");
        if let Err(e) = self.transport.open(&url, self.config.policy.connect_timeout) {
            log::warn!("connection to {url} failed: {e}");
            self.connection_lost(now);
        }
    }

    fn connection_lost(&mut self, now: Instant) {
        self.state = ConnectionState::Disconnected;
        if self.url.is_none() {
            return;
        }
        let policy = self.config.policy;
        if self.attempts < policy.max_attempts {
            self.attempts += 1;
            self.retry_at = Some(now + policy.delay);
            log::info!(
                "reconnect attempt {}/{} in {:?}",
                self.attempts,
                policy.max_attempts,
                policy.delay
            );
        } else {
            self.retry_at = None;
            log::warn!("giving up after {} reconnect attempts", policy.max_attempts);
        }
    }

    /// Drive the connection and return decoded server messages.
    pub fn poll(&mut self, now: Instant) -> Vec<ServerMessage> {
        if self.state == ConnectionState::Disconnected
            && self.retry_at.is_some_and(|at| now >= at)
        {
            self.retry_at = None;
            self.open(now);
        }

        let mut messages = Vec::new();
        for event in self.transport.poll_events() {
            match event {
                TransportEvent::Opened => {
                    log::info!("connected to room server");
                    self.state = ConnectionState::Connected;
                    self.attempts = 0;
                }
                TransportEvent::Message(text) => match ServerMessage::from_json(&text) {
                    Ok(message) => messages.push(message),
                    Err(e) => log::warn!("dropping malformed server frame: {e}"),
                },
                TransportEvent::Closed => {
                    if self.state != ConnectionState::Disconnected {
                        log::info!("connection closed");
                        self.connection_lost(now);
                    }
                }
                TransportEvent::Failed(reason) => {
                    if self.state != ConnectionState::Disconnected {
                        log::warn!("connection failed: {reason}");
                        self.connection_lost(now);
                    }
                }
            }
        }
        messages
    }

    /// Send a message if connected. Returns whether it was handed to the transport.
    /// Encode and send one message.
    pub fn try_emit(&mut self, message: &ClientMessage) -> Result<(), SyncError> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let json = message.to_json()?;
        self.transport.send(json)
    }

    /// Like [`try_emit`](Self::try_emit), but failures are logged and dropped.
    pub fn emit(&mut self, message: &ClientMessage) -> bool {
        match self.try_emit(message) {
            Ok(()) => true,
            Err(SyncError::NotConnected) => {
                log::debug!("not connected, dropping outgoing message");
                false
            }
            Err(e) => {
                log::warn!("failed to emit {}: {e}", message.event_name());
                false
            }
        }
    }

    pub fn emit_cursor(&mut self, user_id: &str, cursor: Point) -> bool {
        self.emit(&ClientMessage::UserCursor(CursorPosition {
            user_id: user_id.to_string(),
            cursor,
        }))
    }

    pub fn emit_element_created(&mut self, element: &DrawingElement) -> bool {
        self.emit(&ClientMessage::ElementCreated(element.to_wire()))
    }

    pub fn emit_element_updated(&mut self, element: &DrawingElement) -> bool {
        self.emit(&ClientMessage::ElementUpdated(element.to_wire()))
    }

    pub fn emit_element_deleted(&mut self, id: &str) -> bool {
        self.emit(&ClientMessage::ElementDeleted(id.to_string()))
    }

    pub fn emit_chat_message(&mut self, message: &ChatMessage) -> bool {
        self.emit(&ClientMessage::ChatMessage(message.clone()))
    }
}

impl Default for SyncChannel<NativeTransport> {
    fn default() -> Self {
        Self::new(NativeTransport::new(), SyncConfig::default())
    }
}

// ============================================================================
// Native WebSocket Client
// ============================================================================

mod native_client {
    use super::*;
    use std::io;
    use std::net::{SocketAddr, TcpStream};
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use tungstenite::Message;

    const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);
    const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Commands sent to the WebSocket thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    /// Blocking `tungstenite` client on a background thread.
    ///
    /// Only plain `ws://` endpoints are supported.
    #[derive(Default)]
    pub struct NativeTransport {
        cmd_tx: Option<Sender<WsCommand>>,
        event_rx: Option<Receiver<TransportEvent>>,
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeTransport {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Transport for NativeTransport {
        fn open(&mut self, url: &Url, timeout: Duration) -> Result<(), SyncError> {
            if url.scheme() != "ws" {
                return Err(SyncError::UnsupportedScheme(url.scheme().to_string()));
            }
            let addrs = url
                .socket_addrs(|| Some(80))
                .map_err(|e| SyncError::Transport(format!("failed to resolve {url}: {e}")))?;
            self.close();

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<TransportEvent>();
            let url = url.to_string();

            let handle = thread::spawn(move || run(&url, &addrs, timeout, cmd_rx, event_tx));

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        fn send(&mut self, text: String) -> Result<(), SyncError> {
            let tx = self.cmd_tx.as_ref().ok_or(SyncError::NotConnected)?;
            tx.send(WsCommand::Send(text))
                .map_err(|e| SyncError::Transport(format!("send failed: {e}")))
        }

        fn poll_events(&mut self) -> Vec<TransportEvent> {
            match &self.event_rx {
                Some(rx) => rx.try_iter().collect(),
                None => Vec::new(),
            }
        }

        fn close(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
        }
    }

    impl Drop for NativeTransport {
        fn drop(&mut self) {
            self.close();
        }
    }

    fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved")
        }))
    }

    fn run(
        url: &str,
        addrs: &[SocketAddr],
        timeout: Duration,
        cmd_rx: Receiver<WsCommand>,
        event_tx: Sender<TransportEvent>,
    ) {
        log::info!("WebSocket thread: connecting to {url}");

        let stream = match connect_any(addrs, timeout) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = event_tx.send(TransportEvent::Failed(format!("connect failed: {e}")));
                return;
            }
        };
        // The handshake gets the full connect timeout; afterwards reads poll.
        let _ = stream.set_read_timeout(Some(timeout));
        let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));

        let (mut socket, response) = match tungstenite::client(url, stream) {
            Ok(pair) => pair,
            Err(e) => {
                let _ = event_tx.send(TransportEvent::Failed(format!("handshake failed: {e}")));
                return;
            }
        };
        log::info!("WebSocket connected, status: {}", response.status());
        let _ = socket.get_mut().set_read_timeout(Some(READ_POLL_INTERVAL));
        let _ = event_tx.send(TransportEvent::Opened);

        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(msg)) => {
                    if let Err(e) = socket.send(Message::Text(msg)) {
                        let _ = event_tx.send(TransportEvent::Failed(format!("send error: {e}")));
                        return;
                    }
                }
                Ok(WsCommand::Close) | Err(TryRecvError::Disconnected) => {
                    log::info!("WebSocket close requested");
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    break;
                }
                Err(TryRecvError::Empty) => {}
            }

            match socket.read() {
                Ok(Message::Text(txt)) => {
                    if event_tx.send(TransportEvent::Message(txt)).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    log::info!("WebSocket received close frame");
                    break;
                }
                // Pings are answered by tungstenite on the next write or read.
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => {
                    let _ = event_tx.send(TransportEvent::Failed(format!("read error: {e}")));
                    return;
                }
            }
        }

        log::info!("WebSocket thread exiting");
        let _ = event_tx.send(TransportEvent::Closed);
    }
}

pub use native_client::NativeTransport;
