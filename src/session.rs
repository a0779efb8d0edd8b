//! Preview session: source, transfer channel and render worker wired together.
//!
//! Teardown closes the source first (no new frames), then terminates the
//! worker, which releases every GPU resource.

use crate::config::SourceConfig;
use crate::playback::{LocalPlayer, PlaybackController, PlayerEvent, RawVideo};
use crate::render::RenderBackend;
use crate::stream::{ConnectionState, StreamClient, WorkerSink};
use crate::transfer::FrameSize;
use crate::worker::{self, StatsSnapshot, WorkerEvent, WorkerHandle};
use anyhow::Context;
use tokio::runtime::Handle;

/// The active media source
pub enum MediaSource {
    Stream(StreamClient),
    Local(LocalPlayer),
}

/// One running preview pipeline
pub struct PreviewSession {
    // Field order matters: the source must go before the worker on drop
    source: Option<MediaSource>,
    worker: WorkerHandle,
    playback: PlaybackController,
    runtime: Handle,
    renderer_size: Option<FrameSize>,
    renderer_error: Option<String>,
}

impl PreviewSession {
    /// Spawn a render worker for backend `B` and start feeding it from `source`
    pub fn start<B>(
        runtime: Handle,
        source: &SourceConfig,
        surface: B::Surface,
        autoplay: bool,
    ) -> anyhow::Result<Self>
    where
        B: RenderBackend + 'static,
    {
        let (worker, channel) = worker::spawn::<B>().context("failed to spawn render worker")?;
        let sink = WorkerSink::new(channel, surface);
        let mut playback = PlaybackController::new();

        let media = match source {
            SourceConfig::Stream { url, framing } => {
                let client = StreamClient::connect(&runtime, url, *framing, sink)?;
                playback.attach(Box::new(client.control()), None, true);
                if !autoplay {
                    let _ = playback.set_playing(false);
                }
                MediaSource::Stream(client)
            }
            SourceConfig::File {
                path,
                width,
                height,
                fps,
            } => {
                let video = RawVideo::open(path, FrameSize::new(*width, *height))?;
                let player = LocalPlayer::start(video, *fps, sink, autoplay)?;
                playback.attach(Box::new(player.control()), Some(player.duration()), autoplay);
                MediaSource::Local(player)
            }
        };

        Ok(Self {
            source: Some(media),
            worker,
            playback,
            runtime,
            renderer_size: None,
            renderer_error: None,
        })
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackController {
        &mut self.playback
    }

    pub fn worker(&self) -> &WorkerHandle {
        &self.worker
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.worker.stats()
    }

    /// Stream connection state, `None` for local media
    pub fn connection_state(&self) -> Option<ConnectionState> {
        match &self.source {
            Some(MediaSource::Stream(client)) => Some(client.state()),
            _ => None,
        }
    }

    /// Size the renderer was initialised with
    pub fn renderer_size(&self) -> Option<FrameSize> {
        self.renderer_size
    }

    /// Why the renderer is inert, if it is
    pub fn renderer_error(&self) -> Option<&str> {
        self.renderer_error.as_deref()
    }

    /// Forward a window resize to the render worker
    pub fn resize_surface(&self, width: u32, height: u32) {
        if self.worker.resize_surface(width, height).is_err() {
            log::debug!("Render worker gone, resize to {}x{} ignored", width, height);
        }
    }

    /// Move a local clip by `delta` frames; no-op for streams
    pub fn step(&mut self, delta: i64) {
        if let Some(MediaSource::Local(player)) = &self.source {
            player.step(delta);
        }
    }

    /// Pull worker events and source positions into the session state
    pub fn update(&mut self) {
        for event in self.worker.poll_events() {
            match event {
                WorkerEvent::Ready { size } => self.renderer_size = Some(size),
                WorkerEvent::Error(message) => {
                    if self.renderer_size.is_none() {
                        self.renderer_error = Some(message);
                    } else {
                        log::warn!("Render worker: {}", message);
                    }
                }
                WorkerEvent::Stopped => {}
            }
        }

        match &self.source {
            Some(MediaSource::Stream(client)) => {
                if let Some(position) = client.position() {
                    self.playback.on_remote_position(position);
                }
            }
            Some(MediaSource::Local(player)) => {
                for event in player.poll_events() {
                    match event {
                        PlayerEvent::Position { time, .. } => self.playback.on_frame_timestamp(time),
                        PlayerEvent::Error(message) => {
                            log::warn!("Local playback stopped: {}", message);
                            let _ = self.playback.set_playing(false);
                        }
                    }
                }
            }
            None => {}
        }
    }

    /// Close the source, then terminate the worker.
    ///
    /// Returns the final worker counters.
    pub async fn shutdown(mut self) -> StatsSnapshot {
        match self.source.take() {
            Some(MediaSource::Stream(mut client)) => client.close().await,
            Some(MediaSource::Local(mut player)) => player.stop(),
            None => {}
        }
        self.playback.detach();

        let mut worker = self.worker;
        let stats = tokio::task::spawn_blocking(move || {
            worker.terminate();
            worker.stats()
        })
        .await;

        match stats {
            Ok(stats) => {
                log::info!("Preview session closed: {:?}", stats);
                stats
            }
            Err(e) => {
                log::error!("Render worker shutdown failed: {}", e);
                StatsSnapshot::default()
            }
        }
    }

    /// [`Self::shutdown`] for callers outside the runtime
    pub fn shutdown_blocking(self) -> StatsSnapshot {
        let runtime = self.runtime.clone();
        runtime.block_on(self.shutdown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{SoftwareBackend, SoftwareSurface};
    use crate::stream::{FrameFeed, FrameFraming, FrameServer, ScriptedFeed, ServerOptions};
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let poll = async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(TIMEOUT, poll).await.is_ok()
    }

    async fn serve(feed: Arc<dyn FrameFeed>, options: ServerOptions) -> (String, tokio::task::JoinHandle<anyhow::Result<()>>) {
        let server = FrameServer::bind("127.0.0.1:0", feed, options).await.unwrap();
        let url = format!("ws://{}", server.local_addr().unwrap());
        (url, tokio::spawn(server.run()))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bad_frame_between_good_ones_is_skipped() {
        let size = FrameSize::new(256, 256);
        let first = Bytes::from(vec![0x11u8; size.byte_len()]);
        let bad = Bytes::from(vec![0x22u8; size.byte_len() - 4]);
        let third = Bytes::from((0..size.byte_len()).map(|i| (i % 251) as u8).collect::<Vec<u8>>());
        let feed = ScriptedFeed::new(size, vec![first, bad, third.clone()]);
        let options = ServerOptions {
            fps: 60.0,
            looping: false,
            ..ServerOptions::default()
        };
        let (url, server) = serve(Arc::new(feed), options).await;

        let surface = SoftwareSurface::new();
        let source = SourceConfig::Stream {
            url,
            framing: FrameFraming::Raw {
                width: 256,
                height: 256,
            },
        };
        let session = PreviewSession::start::<SoftwareBackend>(Handle::current(), &source, surface.clone(), true).unwrap();

        assert!(wait_for(|| session.stats().frames_drawn == 2 && session.stats().dropped_size == 1).await);
        assert_eq!(surface.presented_count(), 2);
        assert_eq!(surface.pixels(), Some(third.to_vec()));

        let stats = session.shutdown().await;
        assert_eq!(stats.frames_drawn, 2);
        assert!(!surface.is_bound());
        server.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_headered_stream_initialises_from_first_header() {
        let size = FrameSize::new(8, 4);
        let video = RawVideo::test_pattern(size, 5);
        let options = ServerOptions {
            fps: 120.0,
            headered: true,
            ..ServerOptions::default()
        };
        let (url, server) = serve(Arc::new(video), options).await;

        let surface = SoftwareSurface::new();
        let source = SourceConfig::Stream {
            url,
            framing: FrameFraming::Headered,
        };
        let mut session = PreviewSession::start::<SoftwareBackend>(Handle::current(), &source, surface.clone(), true).unwrap();

        assert!(
            wait_for(|| {
                session.update();
                session.renderer_size() == Some(size) && surface.presented_count() > 0
            })
            .await
        );
        assert_eq!(surface.frame_size(), Some(size));
        assert_eq!(session.connection_state(), Some(ConnectionState::Connected));
        assert!(session.renderer_error().is_none());

        session.shutdown().await;
        server.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_nothing_drawn_after_shutdown() {
        let video = RawVideo::test_pattern(FrameSize::new(4, 4), 8);
        let options = ServerOptions {
            fps: 200.0,
            ..ServerOptions::default()
        };
        let (url, server) = serve(Arc::new(video), options).await;

        let surface = SoftwareSurface::new();
        let source = SourceConfig::Stream {
            url,
            framing: FrameFraming::Raw { width: 4, height: 4 },
        };
        let session = PreviewSession::start::<SoftwareBackend>(Handle::current(), &source, surface.clone(), true).unwrap();
        assert!(wait_for(|| surface.presented_count() >= 3).await);

        let stats = session.shutdown().await;
        let presented = surface.presented_count();
        assert_eq!(presented, stats.frames_drawn);
        assert!(!surface.is_bound());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(surface.presented_count(), presented);
        server.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_file_seek_reaches_surface() {
        let size = FrameSize::new(2, 2);
        let data: Vec<u8> = (0..4u8).flat_map(|i| vec![i * 10; size.byte_len()]).collect();
        let path = std::env::temp_dir().join(format!("stream-preview-session-{}.rgba", std::process::id()));
        std::fs::write(&path, &data).unwrap();

        let surface = SoftwareSurface::new();
        let source = SourceConfig::File {
            path: path.clone(),
            width: 2,
            height: 2,
            fps: 30.0,
        };
        let mut session = PreviewSession::start::<SoftwareBackend>(Handle::current(), &source, surface.clone(), false).unwrap();
        assert!(wait_for(|| surface.presented_count() == 1).await);
        assert_eq!(surface.pixels(), Some(vec![0; size.byte_len()]));

        session.playback_mut().seek(1.0).unwrap();
        assert!(wait_for(|| surface.presented_count() == 2).await);
        assert_eq!(surface.pixels(), Some(vec![30; size.byte_len()]));

        // Clip frames share one buffer, so every transfer copies
        assert_eq!(session.stats().copied, 2);

        session.step(1);
        assert!(wait_for(|| surface.presented_count() == 3).await);
        assert_eq!(surface.pixels(), Some(vec![0; size.byte_len()]));

        assert!(
            wait_for(|| {
                session.update();
                session.playback().progress() == 0.0
            })
            .await
        );

        session.shutdown().await;
        assert!(!surface.is_bound());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_file_fails_to_start() {
        let source = SourceConfig::File {
            path: "/nonexistent/clip.rgba".into(),
            width: 2,
            height: 2,
            fps: 30.0,
        };
        let result = PreviewSession::start::<SoftwareBackend>(Handle::current(), &source, SoftwareSurface::new(), true);
        assert!(result.is_err());
    }
}
