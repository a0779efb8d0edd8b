//! WebSocket frame source
//!
//! Connects to a frame server, forwards every binary message to a
//! [`FrameSink`] and publishes connection state and the server-reported
//! position through `watch` channels. The socket lives on a tokio task owned
//! by the control side.

use super::protocol::{decode_frame, ClientMessage, FrameFraming, ServerMessage};
use super::sink::FrameSink;
use crate::playback::{MediaControl, PlaybackError};
use crate::transfer::TransferError;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// How long to wait for the server to acknowledge a close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("not a WebSocket URL: {0}")]
    InvalidUrl(String),
    #[error("stream connection is closed")]
    Closed,
}

/// Lifecycle of the stream connection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Closed,
    Error(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Closed => write!(f, "Disconnected"),
            ConnectionState::Error(e) => write!(f, "Connection error: {}", e),
        }
    }
}

/// Counters for one connection
#[derive(Debug, Default)]
struct StreamCounters {
    received: AtomicU64,
    malformed: AtomicU64,
    delivered: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of the stream counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Binary messages received
    pub received: u64,
    /// Headered messages dropped as malformed
    pub malformed: u64,
    /// Frames handed to the sink
    pub delivered: u64,
    /// Frames the sink refused (worker gone)
    pub rejected: u64,
}

/// Sends control messages to the connected server
#[derive(Debug, Clone)]
pub struct RemoteControl {
    control_tx: mpsc::UnboundedSender<ClientMessage>,
}

impl RemoteControl {
    pub fn send(&self, message: ClientMessage) -> Result<(), StreamError> {
        self.control_tx.send(message).map_err(|_| StreamError::Closed)
    }
}

impl MediaControl for RemoteControl {
    fn seek(&mut self, fraction: f64) -> Result<(), PlaybackError> {
        self.send(ClientMessage::Seek { position: fraction })
            .map_err(|e| PlaybackError::Seek(e.to_string()))
    }

    fn set_playing(&mut self, playing: bool) -> Result<(), PlaybackError> {
        let message = if playing { ClientMessage::Play } else { ClientMessage::Pause };
        self.send(message).map_err(|_| PlaybackError::Disconnected)
    }
}

/// Control-side handle to a stream connection.
///
/// Dropping the client closes the socket in the background; use
/// [`StreamClient::close`] to wait for it.
pub struct StreamClient {
    state_rx: watch::Receiver<ConnectionState>,
    position_rx: watch::Receiver<Option<f64>>,
    control: RemoteControl,
    close_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    counters: Arc<StreamCounters>,
}

impl StreamClient {
    /// Start connecting to `url` on `runtime`.
    ///
    /// With raw framing the sink is started right after the handshake; with
    /// headered framing it is started from the first valid header.
    pub fn connect<K: FrameSink>(
        runtime: &Handle,
        url: &str,
        framing: FrameFraming,
        sink: K,
    ) -> Result<Self, StreamError> {
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(StreamError::InvalidUrl(url.to_string()));
        }

        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (position_tx, position_rx) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        let counters = Arc::new(StreamCounters::default());

        let connection = Connection {
            url: url.to_string(),
            framing,
            sink,
            started: false,
            state_tx,
            position_tx,
            counters: Arc::clone(&counters),
        };
        let task = runtime.spawn(connection.run(control_rx, close_rx));

        Ok(Self {
            state_rx,
            position_rx,
            control: RemoteControl { control_tx },
            close_tx: Some(close_tx),
            task: Some(task),
            counters,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Receiver that changes whenever the connection state does
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Last position the server reported
    pub fn position(&self) -> Option<f64> {
        *self.position_rx.borrow()
    }

    pub fn subscribe_position(&self) -> watch::Receiver<Option<f64>> {
        self.position_rx.clone()
    }

    pub fn control(&self) -> RemoteControl {
        self.control.clone()
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            received: self.counters.received.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Close the socket and wait until the connection task finished.
    ///
    /// No frame reaches the sink after this returns.
    pub async fn close(&mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("Stream task failed: {}", e);
            }
        }
    }
}

struct Connection<K> {
    url: String,
    framing: FrameFraming,
    sink: K,
    started: bool,
    state_tx: watch::Sender<ConnectionState>,
    position_tx: watch::Sender<Option<f64>>,
    counters: Arc<StreamCounters>,
}

impl<K: FrameSink> Connection<K> {
    async fn run(
        mut self,
        mut control_rx: mpsc::UnboundedReceiver<ClientMessage>,
        mut close_rx: oneshot::Receiver<()>,
    ) {
        self.state_tx.send_replace(ConnectionState::Connecting);
        log::info!("Connecting to frame stream at {}", self.url);

        let connect = tokio_tungstenite::connect_async(self.url.as_str());
        let ws_stream = tokio::select! {
            _ = &mut close_rx => {
                self.state_tx.send_replace(ConnectionState::Closed);
                return;
            }
            result = connect => match result {
                Ok((ws_stream, _)) => ws_stream,
                Err(e) => {
                    log::warn!("Failed to connect to {}: {}", self.url, e);
                    self.state_tx.send_replace(ConnectionState::Error(e.to_string()));
                    return;
                }
            },
        };

        log::info!("Connected to {}", self.url);
        self.state_tx.send_replace(ConnectionState::Connected);

        if let Some(size) = self.framing.known_size() {
            self.start(size);
        }

        let (mut write, mut read) = ws_stream.split();

        let final_state = loop {
            tokio::select! {
                _ = &mut close_rx => {
                    let _ = write.send(Message::Close(None)).await;
                    // Drain until the server acknowledges, frames are discarded
                    let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
                        while let Some(Ok(message)) = read.next().await {
                            if message.is_close() {
                                break;
                            }
                        }
                    })
                    .await;
                    break ConnectionState::Closed;
                }

                Some(message) = control_rx.recv() => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            log::error!("Failed to encode {:?}: {}", message, e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(text)).await {
                        log::warn!("Failed to send {:?}: {}", message, e);
                        break ConnectionState::Error(e.to_string());
                    }
                }

                message = read.next() => match message {
                    Some(Ok(Message::Binary(data))) => self.handle_frame(Bytes::from(data)),
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("Frame stream at {} closed by server", self.url);
                        break ConnectionState::Closed;
                    }
                    Some(Err(e)) => {
                        log::warn!("Frame stream error: {}", e);
                        break ConnectionState::Error(e.to_string());
                    }
                    Some(Ok(_)) => {}
                },
            }
        };

        self.state_tx.send_replace(final_state);
    }

    fn start(&mut self, size: crate::transfer::FrameSize) {
        match self.sink.start(size) {
            Ok(()) => {
                log::info!("Stream frames are {}", size);
                self.started = true;
            }
            Err(e) => log::warn!("Frame sink refused start at {}: {}", size, e),
        }
    }

    fn handle_frame(&mut self, data: Bytes) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let mut frame = match decode_frame(self.framing, data) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Dropping malformed frame message: {}", e);
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        if !self.started {
            if let Some(size) = frame.announced_size() {
                self.start(size);
            }
        }

        match self.sink.frame(&mut frame) {
            Ok(_) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(TransferError::Closed) => {
                if self.counters.rejected.fetch_add(1, Ordering::Relaxed) == 0 {
                    log::warn!("Render worker is gone, discarding stream frames");
                }
            }
            Err(e) => {
                log::error!("Failed to hand frame over: {}", e);
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Position { position }) => {
                self.position_tx.send_replace(Some(position.clamp(0.0, 1.0)));
            }
            Ok(ServerMessage::Error { message }) => {
                log::warn!("Frame server reported: {}", message);
            }
            Err(e) => log::debug!("Ignoring unknown text message: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::sink::testing::RecordingSink;

    #[test]
    fn test_rejects_non_websocket_url() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (tx, _rx) = crossbeam_channel::unbounded();
        let result = StreamClient::connect(
            runtime.handle(),
            "http://localhost:9001",
            FrameFraming::Headered,
            RecordingSink(tx),
        );
        assert!(matches!(result, Err(StreamError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, _rx) = crossbeam_channel::unbounded();
        let client = StreamClient::connect(
            &Handle::current(),
            &format!("ws://{}", addr),
            FrameFraming::Headered,
            RecordingSink(tx),
        )
        .unwrap();

        let mut state = client.subscribe_state();
        let reached = tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| matches!(s, ConnectionState::Error(_))),
        )
        .await;
        assert!(reached.is_ok());
        assert!(client.state().to_string().starts_with("Connection error"));
    }

    #[test]
    fn test_state_text() {
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(ConnectionState::Closed.to_string(), "Disconnected");
    }
}
