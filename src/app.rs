//! Preview window
//!
//! Owns the winit window and the tokio runtime for the socket. The window's
//! surface is handed to the render worker of the current session; this side
//! only routes input to the playback controller and scrub bar and keeps the
//! status line in the window title.

use crate::config::{BackendKind, PreviewConfig, SourceConfig};
use crate::render::{PresentTarget, SoftwareBackend, SoftwareSurface, WgpuBackend};
use crate::session::PreviewSession;
use crate::ui::{BarRect, HostEvent, PointerGrab, ProgressBar, SourceStatus, StatusLine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::Window;

/// Height of the scrub strip along the bottom edge, in physical pixels
const BAR_HEIGHT: f64 = 24.0;

/// How often status and progress are refreshed
const STATUS_INTERVAL: Duration = Duration::from_millis(50);

pub struct PreviewApp {
    config: PreviewConfig,
    window: Arc<Window>,
    runtime: tokio::runtime::Runtime,
    session: Option<PreviewSession>,
    /// Source of the running (or last failed) session, for refresh
    source: Option<SourceConfig>,
    progress_bar: ProgressBar,
    grab: Option<PointerGrab>,
    cursor: (f64, f64),
    /// Files dropped since the last event batch
    dropped: Vec<PathBuf>,
    status: StatusLine,
    title: String,
    /// Presented image when running without a GPU
    software_surface: Option<SoftwareSurface>,
}

impl PreviewApp {
    pub fn new(config: PreviewConfig, window: Arc<Window>) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("stream-io")
            .enable_all()
            .build()?;

        let size = window.inner_size();
        let mut app = Self {
            title: config.window.title.clone(),
            source: config.source.clone(),
            config,
            window,
            runtime,
            session: None,
            progress_bar: ProgressBar::new(bar_rect(size)),
            grab: None,
            cursor: (0.0, 0.0),
            dropped: Vec::new(),
            status: StatusLine::default(),
            software_surface: None,
        };

        if let Some(source) = app.source.clone() {
            app.start_session(source);
        }
        app.refresh_status();
        Ok(app)
    }

    /// Dispatch one event from the event loop
    pub fn handle_event(&mut self, event: Event<()>, elwt: &EventLoopWindowTarget<()>) {
        match event {
            Event::WindowEvent { window_id, event } if window_id == self.window.id() => {
                self.handle_window_event(event, elwt);
            }
            Event::AboutToWait => {
                if !self.dropped.is_empty() {
                    let paths = std::mem::take(&mut self.dropped);
                    self.handle_host_event(HostEvent::FilesDropped(paths));
                }
                self.refresh_status();
                elwt.set_control_flow(ControlFlow::WaitUntil(Instant::now() + STATUS_INTERVAL));
            }
            Event::LoopExiting => self.stop_session(),
            _ => {}
        }
    }

    fn handle_window_event(&mut self, event: WindowEvent, elwt: &EventLoopWindowTarget<()>) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting...");
                self.stop_session();
                elwt.exit();
            }

            WindowEvent::Resized(size) => {
                self.progress_bar.set_rect(bar_rect(size));
                if let Some(session) = &self.session {
                    session.resize_surface(size.width, size.height);
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x, position.y);
                if let Some(grab) = &self.grab {
                    let session = &mut self.session;
                    self.progress_bar
                        .pointer_move(grab, position.x, |fraction| seek(session, fraction));
                }
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed if self.grab.is_none() => {
                    let (x, y) = self.cursor;
                    let session = &mut self.session;
                    self.grab = self
                        .progress_bar
                        .pointer_down(x, y, |fraction| seek(session, fraction));
                }
                ElementState::Released => {
                    if let Some(grab) = self.grab.take() {
                        self.progress_bar.pointer_up(grab);
                    }
                }
                _ => {}
            },

            WindowEvent::Focused(false) => {
                if let Some(grab) = self.grab.take() {
                    self.progress_bar.cancel(grab);
                }
            }

            WindowEvent::DroppedFile(path) => self.dropped.push(path),

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => match logical_key {
                Key::Named(NamedKey::Escape) => {
                    self.stop_session();
                    elwt.exit();
                }
                Key::Named(NamedKey::Space) => {
                    if let Some(session) = &mut self.session {
                        let _ = session.playback_mut().toggle_playing();
                    }
                }
                Key::Named(NamedKey::ArrowLeft) => self.step(-1),
                Key::Named(NamedKey::ArrowRight) => self.step(1),
                Key::Named(NamedKey::F5) => self.handle_host_event(HostEvent::Refresh),
                Key::Character(c) if c.as_str() == "s" => self.save_snapshot(),
                _ => {}
            },

            _ => {}
        }
    }

    pub fn handle_host_event(&mut self, event: HostEvent) {
        match &event {
            HostEvent::FilesDropped(paths) => match event.dropped_file() {
                Some(path) => {
                    let source = self.config.raw_file(path.to_path_buf());
                    self.start_session(source);
                }
                None => log::info!("Ignoring drop of {} files", paths.len()),
            },
            HostEvent::Refresh => match self.source.clone() {
                Some(source) => {
                    log::info!("Reloading");
                    self.start_session(source);
                }
                None => log::info!("Nothing to reload"),
            },
            HostEvent::ConversionProgress(percent) => self.status.set_conversion_progress(*percent),
        }
    }

    fn start_session(&mut self, source: SourceConfig) {
        self.stop_session();
        self.status.notice = None;
        self.status.renderer_error = None;

        let handle = self.runtime.handle().clone();
        let autoplay = self.config.autoplay;
        let result = match self.config.backend {
            BackendKind::Gpu => PreviewSession::start::<WgpuBackend>(
                handle,
                &source,
                PresentTarget::Window(Arc::clone(&self.window)),
                autoplay,
            ),
            BackendKind::Software => {
                let surface = SoftwareSurface::new();
                self.software_surface = Some(surface.clone());
                PreviewSession::start::<SoftwareBackend>(handle, &source, surface, autoplay)
            }
        };

        self.status.source = match &source {
            SourceConfig::Stream { .. } => SourceStatus::Stream(Default::default()),
            SourceConfig::File { path, .. } => SourceStatus::File(display_name(path)),
        };

        match result {
            Ok(session) => {
                let size = self.window.inner_size();
                session.resize_surface(size.width, size.height);
                self.session = Some(session);
            }
            Err(e) => {
                log::error!("Failed to start preview: {:#}", e);
                self.status.notice = Some(format!("Failed to open: {}", e));
                self.status.source = SourceStatus::None;
            }
        }
        self.source = Some(source);
    }

    fn stop_session(&mut self) {
        if let Some(grab) = self.grab.take() {
            self.progress_bar.cancel(grab);
        }
        if let Some(session) = self.session.take() {
            session.shutdown_blocking();
        }
    }

    fn step(&mut self, delta: i64) {
        if let Some(session) = &mut self.session {
            session.step(delta);
        }
    }

    fn save_snapshot(&self) {
        let Some(surface) = &self.software_surface else {
            log::info!("Snapshots are only available with the software backend");
            return;
        };
        if let Err(e) = surface.save_png(std::path::Path::new("snapshot.png")) {
            log::warn!("Failed to save snapshot: {}", e);
        }
    }

    fn refresh_status(&mut self) {
        if let Some(session) = &mut self.session {
            session.update();

            if let Some(state) = session.connection_state() {
                self.status.source = SourceStatus::Stream(state);
            }
            let playback = session.playback();
            self.status.playback = playback.state();
            self.status.duration = playback.duration();
            self.status.progress = self.progress_bar.display_fraction(playback.progress());
            self.status.renderer_error = session.renderer_error().map(str::to_string);
        }

        let title = format!("{} - {}", self.config.window.title, self.status.text());
        if title != self.title {
            self.window.set_title(&title);
            self.title = title;
        }
    }
}

fn seek(session: &mut Option<PreviewSession>, fraction: f64) {
    if let Some(session) = session {
        let _ = session.playback_mut().seek(fraction);
    }
}

fn bar_rect(size: PhysicalSize<u32>) -> BarRect {
    let height = BAR_HEIGHT.min(size.height as f64);
    BarRect::new(0.0, size.height as f64 - height, size.width as f64, height)
}

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_spans_bottom_strip() {
        let rect = bar_rect(PhysicalSize::new(800, 600));
        assert_eq!(rect, BarRect::new(0.0, 576.0, 800.0, 24.0));
        assert!(rect.contains(400.0, 590.0));
        assert!(!rect.contains(400.0, 300.0));

        // Tiny windows are all bar
        assert_eq!(bar_rect(PhysicalSize::new(10, 10)), BarRect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(std::path::Path::new("/clips/intro.rgba")), "intro.rgba");
    }
}
