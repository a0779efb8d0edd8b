//! Transfer of frame buffers from the control side to the render worker
//!
//! A buffer handed over here belongs to the worker afterwards. The sender keeps
//! a detached [`Transferable`] that fails fast if it is read or posted again.

mod buffer;
mod channel;

pub use buffer::{FrameBuffer, FrameSize, TransferMode, BYTES_PER_PIXEL};
pub use channel::TransferChannel;

use bytes::Bytes;
use thiserror::Error;

/// Errors raised on the sending side of a transfer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("buffer was already transferred to the render worker")]
    Detached,
    #[error("render worker is no longer running")]
    Closed,
}

/// Sender-side handle over an incoming buffer.
///
/// `detach` hands the bytes over exactly once; afterwards every access
/// returns [`TransferError::Detached`].
#[derive(Debug)]
pub struct Transferable {
    bytes: Option<Bytes>,
    announced: Option<FrameSize>,
}

impl Transferable {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: Some(bytes.into()),
            announced: None,
        }
    }

    /// Carry the dimensions a stream header announced for these bytes
    pub fn with_announced_size(mut self, size: FrameSize) -> Self {
        self.announced = Some(size);
        self
    }

    pub fn announced_size(&self) -> Option<FrameSize> {
        self.announced
    }

    pub fn is_detached(&self) -> bool {
        self.bytes.is_none()
    }

    /// Read access while the handle still owns its bytes
    pub fn bytes(&self) -> Result<&[u8], TransferError> {
        self.bytes.as_deref().ok_or(TransferError::Detached)
    }

    /// Move the bytes out, leaving this handle detached
    pub fn detach(&mut self) -> Result<(FrameBuffer, TransferMode), TransferError> {
        let bytes = self.bytes.take().ok_or(TransferError::Detached)?;
        let (frame, mode) = FrameBuffer::transfer(bytes);
        let frame = match self.announced {
            Some(size) => frame.with_announced_size(size),
            None => frame,
        };
        Ok((frame, mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detach_once() {
        let mut handle = Transferable::new(vec![1u8, 2, 3, 4]);
        assert_eq!(handle.bytes().unwrap(), &[1, 2, 3, 4]);

        let (frame, mode) = handle.detach().unwrap();
        assert_eq!(mode, TransferMode::Moved);
        assert_eq!(frame.as_bytes(), &[1, 2, 3, 4]);

        assert!(handle.is_detached());
        assert_eq!(handle.bytes(), Err(TransferError::Detached));
        assert_eq!(handle.detach().unwrap_err(), TransferError::Detached);
    }

    #[test]
    fn test_announced_size_follows_frame() {
        let size = FrameSize::new(1, 1);
        let mut handle = Transferable::new(vec![0u8; 4]).with_announced_size(size);
        let (frame, _) = handle.detach().unwrap();
        assert_eq!(frame.announced_size(), Some(size));
    }
}
