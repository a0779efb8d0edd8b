//! Frame streaming over WebSocket
//!
//! The client side turns binary messages into transferable frames for the
//! render worker; the server side produces such a stream from a clip or a
//! generated pattern.

mod client;
mod protocol;
mod server;
pub(crate) mod sink;

pub use client::{ConnectionState, RemoteControl, StreamClient, StreamError, StreamStats};
pub use protocol::{decode_frame, ClientMessage, FrameFraming, ProtocolError, ServerMessage, StreamHeader};
pub use server::{FrameFeed, FrameServer, ScriptedFeed, ServerOptions};
pub use sink::{FrameSink, WorkerSink};
