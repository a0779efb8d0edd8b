//! WebSocket frame server
//!
//! Streams frames from a [`FrameFeed`] to every connected client at a fixed
//! rate. Clients can pause, resume and seek; the server answers with the new
//! position.

use super::protocol::{ClientMessage, ServerMessage, StreamHeader};
use crate::playback::{frame_index_at, frame_interval, frame_position, RawVideo};
use crate::transfer::FrameSize;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;

/// Source of frames for the server
pub trait FrameFeed: Send + Sync + 'static {
    /// Nominal size of every frame
    fn frame_size(&self) -> FrameSize;

    fn frame_count(&self) -> usize;

    /// Pixels of frame `index`
    fn frame(&self, index: usize) -> Bytes;
}

impl FrameFeed for RawVideo {
    fn frame_size(&self) -> FrameSize {
        self.size()
    }

    fn frame_count(&self) -> usize {
        RawVideo::frame_count(self)
    }

    fn frame(&self, index: usize) -> Bytes {
        RawVideo::frame(self, index)
    }
}

/// Fixed list of payloads, sent as-is even when they do not match the size
#[derive(Debug, Clone)]
pub struct ScriptedFeed {
    size: FrameSize,
    payloads: Vec<Bytes>,
}

impl ScriptedFeed {
    pub fn new(size: FrameSize, payloads: Vec<Bytes>) -> Self {
        Self { size, payloads }
    }
}

impl FrameFeed for ScriptedFeed {
    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn frame_count(&self) -> usize {
        self.payloads.len()
    }

    fn frame(&self, index: usize) -> Bytes {
        self.payloads.get(index).cloned().unwrap_or_default()
    }
}

/// Stream settings shared by all connections
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerOptions {
    /// Frames per second sent to each client
    pub fps: f64,
    /// Prefix every frame with a [`StreamHeader`]
    pub headered: bool,
    /// Start over after the last frame
    pub looping: bool,
    /// Start sending as soon as a client connects
    pub start_playing: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            fps: 30.0,
            headered: false,
            looping: true,
            start_playing: true,
        }
    }
}

/// WebSocket server streaming one feed
pub struct FrameServer {
    listener: TcpListener,
    feed: Arc<dyn FrameFeed>,
    options: ServerOptions,
    interval: Duration,
    clients: Arc<AtomicUsize>,
}

impl FrameServer {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        feed: Arc<dyn FrameFeed>,
        options: ServerOptions,
    ) -> std::io::Result<Self> {
        let interval = frame_interval(options.fps).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid frame rate {}", options.fps),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            feed,
            options,
            interval,
            clients: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of connected clients
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    /// Accept clients until the task is dropped
    pub async fn run(self) -> anyhow::Result<()> {
        log::info!(
            "Frame server listening on ws://{} ({} frames of {} at {} fps{})",
            self.listener.local_addr()?,
            self.feed.frame_count(),
            self.feed.frame_size(),
            self.options.fps,
            if self.options.headered { ", headered" } else { "" }
        );

        loop {
            let (stream, addr) = self.listener.accept().await?;
            let feed = Arc::clone(&self.feed);
            let options = self.options;
            let interval = self.interval;
            let clients = Arc::clone(&self.clients);

            tokio::spawn(async move {
                clients.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = Self::handle_connection(stream, addr, feed, options, interval).await {
                    log::error!("Error streaming to {}: {}", addr, e);
                }
                clients.fetch_sub(1, Ordering::Relaxed);
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        feed: Arc<dyn FrameFeed>,
        options: ServerOptions,
        interval: Duration,
    ) -> anyhow::Result<()> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        log::info!("Streaming to {}", addr);

        let (mut write, mut read) = ws_stream.split();
        let count = feed.frame_count();
        let mut index = 0usize;
        let mut playing = options.start_playing;

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick(), if playing && index < count => {
                    write.send(Message::Binary(Self::encode(feed.as_ref(), index, options.headered))).await?;
                    let position = ServerMessage::Position { position: frame_position(index, count) };
                    write.send(Message::Text(serde_json::to_string(&position)?)).await?;

                    index += 1;
                    if index == count && options.looping {
                        index = 0;
                    }
                }

                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Seek { position }) => {
                                index = frame_index_at(position, count);
                                log::debug!("{} seeked to frame {}", addr, index);
                                Some(ServerMessage::Position { position: frame_position(index, count) })
                            }
                            Ok(ClientMessage::Play) => {
                                playing = true;
                                None
                            }
                            Ok(ClientMessage::Pause) => {
                                playing = false;
                                None
                            }
                            Err(e) => Some(ServerMessage::Error { message: format!("Invalid message: {}", e) }),
                        };
                        if let Some(reply) = reply {
                            write.send(Message::Text(serde_json::to_string(&reply)?)).await?;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        log::warn!("WebSocket error for {}: {}", addr, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }

        let _ = write.close().await;
        log::info!("Client {} disconnected", addr);
        Ok(())
    }

    fn encode(feed: &dyn FrameFeed, index: usize, headered: bool) -> Vec<u8> {
        let payload = feed.frame(index);
        if headered {
            StreamHeader::new(feed.frame_size()).encode(&payload)
        } else {
            payload.to_vec()
        }
    }
}
