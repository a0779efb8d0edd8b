//! Render worker
//!
//! A dedicated thread that owns the render surface and everything created from
//! it. The control side talks to it only through a [`TransferChannel`] (init,
//! resize, frames) and reads [`WorkerEvent`]s back; it never touches the GPU
//! handles directly.
//!
//! The worker is reactive: it draws exactly once per accepted frame and does
//! nothing in between.

mod context;
mod stats;

pub use context::{FrameOutcome, RenderSurfaceContext};
pub use stats::{StatsSnapshot, WorkerStats};

use crate::render::RenderBackend;
use crate::transfer::{FrameBuffer, FrameSize, TransferChannel, TransferError};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Capacity of the worker event queue
const EVENT_QUEUE_DEPTH: usize = 64;

/// Control messages for the render worker (never coalesced)
pub enum WorkerCommand<S> {
    /// Create the render surface context; must be the first command
    Init { surface: S, width: u32, height: u32 },
    /// The drawable changed size; the frame texture keeps its size
    Resize { width: u32, height: u32 },
}

/// Events from the render worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Init succeeded, frames of `size` are now drawn
    Ready { size: FrameSize },
    /// Init failed or was rejected
    Error(String),
    /// The worker released its surface and exited
    Stopped,
}

/// Control-side handle to a running render worker.
///
/// Dropping the handle terminates the worker and releases its surface.
pub struct WorkerHandle {
    shutdown_tx: Sender<()>,
    /// Sends `Resize` on the command queue without knowing the surface type
    resizer: Box<dyn Fn(u32, u32) -> bool + Send>,
    event_rx: Receiver<WorkerEvent>,
    stats: Arc<WorkerStats>,
    thread: Option<JoinHandle<()>>,
}

/// Start a render worker for backend `B`.
///
/// Returns the handle used for lifecycle and events, and the channel used to
/// initialise the worker and feed it frames.
pub fn spawn<B>() -> std::io::Result<(WorkerHandle, TransferChannel<B::Surface>)>
where
    B: RenderBackend + 'static,
{
    let (command_tx, command_rx) = unbounded::<WorkerCommand<B::Surface>>();
    let (frame_tx, frame_rx) = bounded::<FrameBuffer>(1);
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    let (event_tx, event_rx) = bounded::<WorkerEvent>(EVENT_QUEUE_DEPTH);

    let stats = Arc::new(WorkerStats::default());
    stats.set_running(true);

    let worker = Worker::<B> {
        state: WorkerState::Waiting,
        event_tx,
        stats: Arc::clone(&stats),
    };
    let frame_reclaim = frame_rx.clone();

    let thread = thread::Builder::new()
        .name("render-worker".into())
        .spawn(move || worker.run(command_rx, frame_rx, shutdown_rx));

    let thread = match thread {
        Ok(thread) => thread,
        Err(e) => {
            stats.set_running(false);
            return Err(e);
        }
    };

    let resize_tx = command_tx.clone();
    let resizer = Box::new(move |width, height| {
        resize_tx
            .send(WorkerCommand::Resize { width, height })
            .is_ok()
    });

    let channel = TransferChannel::new(command_tx, frame_tx, frame_reclaim, Arc::clone(&stats));
    let handle = WorkerHandle {
        shutdown_tx,
        resizer,
        event_rx,
        stats,
        thread: Some(thread),
    };

    Ok((handle, channel))
}

impl WorkerHandle {
    /// Events emitted so far (non-blocking)
    pub fn poll_events(&self) -> Vec<WorkerEvent> {
        self.event_rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next event
    pub fn wait_event(&self, timeout: Duration) -> Option<WorkerEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Tell the worker its drawable changed size
    pub fn resize_surface(&self, width: u32, height: u32) -> Result<(), TransferError> {
        if self.is_running() && (self.resizer)(width, height) {
            Ok(())
        } else {
            Err(TransferError::Closed)
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some() && self.stats.is_running()
    }

    /// Stop the worker and wait until it released its surface.
    ///
    /// Frames still queued are discarded. Calling this twice is a no-op.
    pub fn terminate(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        let _ = self.shutdown_tx.try_send(());
        if thread.join().is_err() {
            log::error!("Render worker panicked during shutdown");
        }
        self.stats.set_running(false);
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

enum WorkerState<B: RenderBackend> {
    /// No init received yet
    Waiting,
    Ready(RenderSurfaceContext<B>),
    /// Init failed; frames are ignored until shutdown
    Inert,
}

struct Worker<B: RenderBackend> {
    state: WorkerState<B>,
    event_tx: Sender<WorkerEvent>,
    stats: Arc<WorkerStats>,
}

impl<B: RenderBackend> Worker<B> {
    fn run(
        mut self,
        command_rx: Receiver<WorkerCommand<B::Surface>>,
        frame_rx: Receiver<FrameBuffer>,
        shutdown_rx: Receiver<()>,
    ) {
        log::info!("Render worker started");
        let mut commands_open = true;
        let mut frames_open = true;
        let no_commands = crossbeam_channel::never();
        let no_frames = crossbeam_channel::never();

        while commands_open || frames_open {
            select! {
                recv(shutdown_rx) -> _ => break,
                recv(if commands_open { &command_rx } else { &no_commands }) -> command => match command {
                    Ok(command) => self.handle_command(command),
                    Err(_) => commands_open = false,
                },
                recv(if frames_open { &frame_rx } else { &no_frames }) -> frame => match frame {
                    Ok(frame) => {
                        // Shutdown and commands posted before this frame win
                        if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                            break;
                        }
                        while let Ok(command) = command_rx.try_recv() {
                            self.handle_command(command);
                        }
                        self.handle_frame(frame);
                    }
                    Err(_) => frames_open = false,
                },
            }
        }

        // Both inputs closed: hold the last image until told to shut down
        if !commands_open && !frames_open {
            let _ = shutdown_rx.recv();
        }

        self.release();
    }

    fn handle_command(&mut self, command: WorkerCommand<B::Surface>) {
        match command {
            WorkerCommand::Init { surface, width, height } => self.init(surface, FrameSize::new(width, height)),
            WorkerCommand::Resize { width, height } => {
                if let WorkerState::Ready(context) = &mut self.state {
                    context.resize_surface(width, height);
                }
            }
        }
    }

    fn init(&mut self, surface: B::Surface, size: FrameSize) {
        match self.state {
            WorkerState::Waiting => match RenderSurfaceContext::<B>::create(surface, size) {
                Ok(context) => {
                    log::info!("Render surface initialized at {}", size);
                    self.state = WorkerState::Ready(context);
                    self.emit(WorkerEvent::Ready { size });
                }
                Err(e) => {
                    log::error!("Render surface init failed: {}", e);
                    self.state = WorkerState::Inert;
                    self.emit(WorkerEvent::Error(e.to_string()));
                }
            },
            WorkerState::Ready(ref context) => {
                log::warn!(
                    "Rejecting init at {}: surface already initialized at {}",
                    size,
                    context.size()
                );
                self.emit(WorkerEvent::Error(format!(
                    "render surface already initialized at {}",
                    context.size()
                )));
            }
            WorkerState::Inert => {
                self.emit(WorkerEvent::Error(
                    "render worker is inert after a failed init".to_string(),
                ));
            }
        }
    }

    fn handle_frame(&mut self, frame: FrameBuffer) {
        match &mut self.state {
            WorkerState::Ready(context) => {
                context.submit(frame, &self.stats);
            }
            WorkerState::Waiting | WorkerState::Inert => {
                log::debug!("Dropping frame of {} bytes: no render surface", frame.len());
                self.stats.record_dropped_inactive();
            }
        }
    }

    fn emit(&self, event: WorkerEvent) {
        if self.event_tx.try_send(event).is_err() {
            log::warn!("Render worker event queue full, event dropped");
        }
    }

    fn release(mut self) {
        // GPU resources go away here, on the thread that created them
        self.state = WorkerState::Waiting;
        self.stats.set_running(false);
        self.emit(WorkerEvent::Stopped);
        log::info!("Render worker stopped");
    }
}
