//! Stream Preview - frame streaming and GPU presentation
//!
//! Frames arrive over a WebSocket (or from a local raw clip), are handed to a
//! dedicated render worker by ownership transfer and drawn as a textured
//! fullscreen quad. The window side only drives playback and the scrub bar.

pub mod app;
pub mod config;
pub mod playback;
pub mod render;
pub mod session;
pub mod stream;
pub mod transfer;
pub mod ui;
pub mod worker;

pub use app::PreviewApp;
pub use config::{LaunchTarget, PreviewConfig, SourceConfig};
pub use session::PreviewSession;
