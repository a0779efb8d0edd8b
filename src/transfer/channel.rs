//! Sending half of the render worker connection.

use super::{FrameBuffer, TransferError, TransferMode, Transferable};
use crate::worker::{WorkerCommand, WorkerStats};
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;

/// Ordered control messages plus a keep-latest frame slot.
///
/// Commands are queued without limit and always reach the worker before any
/// frame posted after them. Frames use a single pending slot: posting while a
/// frame is still waiting replaces it, so a slow worker only ever sees the
/// newest image.
pub struct TransferChannel<S> {
    command_tx: Sender<WorkerCommand<S>>,
    frame_tx: Sender<FrameBuffer>,
    /// Used to evict a stale pending frame; never drained otherwise
    frame_reclaim: Receiver<FrameBuffer>,
    stats: Arc<WorkerStats>,
}

impl<S> TransferChannel<S> {
    pub(crate) fn new(
        command_tx: Sender<WorkerCommand<S>>,
        frame_tx: Sender<FrameBuffer>,
        frame_reclaim: Receiver<FrameBuffer>,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            command_tx,
            frame_tx,
            frame_reclaim,
            stats,
        }
    }

    /// Hand the drawable over to the worker together with the video size
    pub fn init(&mut self, surface: S, width: u32, height: u32) -> Result<(), TransferError> {
        self.command(WorkerCommand::Init { surface, width, height })
    }

    /// Tell the worker the drawable changed size
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), TransferError> {
        self.command(WorkerCommand::Resize { width, height })
    }

    /// Post the bytes held by `frame`, leaving it detached
    pub fn post(&mut self, frame: &mut Transferable) -> Result<TransferMode, TransferError> {
        self.ensure_open()?;
        let (buffer, mode) = frame.detach()?;
        self.post_buffer(buffer, mode)
    }

    /// Post freshly received bytes
    pub fn send(&mut self, bytes: impl Into<Bytes>) -> Result<TransferMode, TransferError> {
        self.post(&mut Transferable::new(bytes))
    }

    /// Post a buffer that is already owned
    pub fn post_frame(&mut self, frame: FrameBuffer) -> Result<(), TransferError> {
        self.ensure_open()?;
        self.offer(frame)
    }

    pub fn is_open(&self) -> bool {
        self.stats.is_running()
    }

    fn command(&mut self, command: WorkerCommand<S>) -> Result<(), TransferError> {
        self.ensure_open()?;
        self.command_tx.send(command).map_err(|_| TransferError::Closed)
    }

    fn post_buffer(&mut self, buffer: FrameBuffer, mode: TransferMode) -> Result<TransferMode, TransferError> {
        if mode == TransferMode::Copied {
            log::debug!("Frame of {} bytes was shared, copied before transfer", buffer.len());
            self.stats.record_copied();
        }
        self.offer(buffer)?;
        Ok(mode)
    }

    fn offer(&mut self, mut frame: FrameBuffer) -> Result<(), TransferError> {
        loop {
            match self.frame_tx.try_send(frame) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    // The worker may take the pending frame between these two calls
                    if self.frame_reclaim.try_recv().is_ok() {
                        self.stats.record_coalesced();
                    }
                    frame = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return Err(TransferError::Closed),
            }
        }
    }

    fn ensure_open(&self) -> Result<(), TransferError> {
        if self.stats.is_running() {
            Ok(())
        } else {
            Err(TransferError::Closed)
        }
    }
}
