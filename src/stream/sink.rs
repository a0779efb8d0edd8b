//! Where decoded stream frames go.

use crate::transfer::{FrameSize, TransferChannel, TransferError, TransferMode, Transferable};

/// Consumer of frames produced by a stream or local player
pub trait FrameSink: Send + 'static {
    /// Called once, before the first frame, with the size frames will have
    fn start(&mut self, size: FrameSize) -> Result<(), TransferError>;

    /// Hand one frame over, detaching it
    fn frame(&mut self, frame: &mut Transferable) -> Result<TransferMode, TransferError>;
}

/// Feeds a render worker: the first `start` hands it the surface
pub struct WorkerSink<S> {
    channel: TransferChannel<S>,
    surface: Option<S>,
}

impl<S> WorkerSink<S> {
    pub fn new(channel: TransferChannel<S>, surface: S) -> Self {
        Self {
            channel,
            surface: Some(surface),
        }
    }
}

impl<S: Send + 'static> FrameSink for WorkerSink<S> {
    fn start(&mut self, size: FrameSize) -> Result<(), TransferError> {
        match self.surface.take() {
            Some(surface) => self.channel.init(surface, size.width, size.height),
            // Later size changes are left to the worker's size check
            None => Ok(()),
        }
    }

    fn frame(&mut self, frame: &mut Transferable) -> Result<TransferMode, TransferError> {
        self.channel.post(frame)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crossbeam_channel::Sender;

    /// Records what a source delivered
    #[derive(Debug, Clone, PartialEq)]
    pub enum SinkEvent {
        Start(FrameSize),
        Frame(Vec<u8>),
    }

    pub struct RecordingSink(pub Sender<SinkEvent>);

    impl FrameSink for RecordingSink {
        fn start(&mut self, size: FrameSize) -> Result<(), TransferError> {
            self.0.send(SinkEvent::Start(size)).map_err(|_| TransferError::Closed)
        }

        fn frame(&mut self, frame: &mut Transferable) -> Result<TransferMode, TransferError> {
            let (buffer, mode) = frame.detach()?;
            self.0
                .send(SinkEvent::Frame(buffer.as_bytes().to_vec()))
                .map_err(|_| TransferError::Closed)?;
            Ok(mode)
        }
    }
}
