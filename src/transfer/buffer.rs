//! Frame buffers moved between the control side and the render worker.

use bytes::Bytes;
use std::fmt;

/// Bytes per RGBA8 pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Dimensions of a video frame in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Expected length of a tightly packed RGBA8 frame.
    ///
    /// Saturates at `usize::MAX`, which no real buffer can match.
    pub fn byte_len(&self) -> usize {
        self.checked_byte_len().unwrap_or(usize::MAX)
    }

    /// Frame length, or `None` when it does not fit in memory
    pub fn checked_byte_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(BYTES_PER_PIXEL)
    }

    /// Length of one row in bytes
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How a buffer reached the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// The backing memory changed owner without copying
    Moved,
    /// The bytes were shared with another owner and had to be copied
    Copied,
}

/// One RGBA8 frame owned by exactly one side of the pipeline.
///
/// Deliberately not `Clone`: once a buffer is handed to the worker the sender
/// has nothing left to read.
pub struct FrameBuffer {
    data: Bytes,
    /// Dimensions announced by a stream header, if the frame carried one
    announced: Option<FrameSize>,
}

impl FrameBuffer {
    /// Take ownership of `bytes`.
    ///
    /// When `bytes` is the only handle to its allocation the memory is moved
    /// as-is. Shared bytes (a slice of a larger buffer, or a clone kept
    /// elsewhere) are copied so the worker never aliases memory another owner
    /// can still observe.
    pub fn transfer(bytes: Bytes) -> (Self, TransferMode) {
        match bytes.try_into_mut() {
            Ok(unique) => (Self::from_bytes(unique.freeze()), TransferMode::Moved),
            Err(shared) => (
                Self::from_bytes(Bytes::copy_from_slice(&shared)),
                TransferMode::Copied,
            ),
        }
    }

    /// Wrap an owned vector without copying
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::from_bytes(Bytes::from(data))
    }

    fn from_bytes(data: Bytes) -> Self {
        Self {
            data,
            announced: None,
        }
    }

    /// Tag the buffer with the dimensions its stream header announced
    pub fn with_announced_size(mut self, size: FrameSize) -> Self {
        self.announced = Some(size);
        self
    }

    pub fn announced_size(&self) -> Option<FrameSize> {
        self.announced
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Check that this buffer is a complete frame of exactly `size`.
    ///
    /// Length must equal `size.byte_len()` and, when the stream announced
    /// dimensions, those must match too (a 128x512 frame has the same length
    /// as a 256x256 one but is not the same frame).
    pub fn fits(&self, size: FrameSize) -> bool {
        self.data.len() == size.byte_len() && self.announced.map_or(true, |a| a == size)
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.data.len())
            .field("announced", &self.announced)
            .finish()
    }
}
