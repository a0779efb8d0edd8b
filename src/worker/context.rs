//! Render surface context: everything `init` creates.

use super::WorkerStats;
use crate::render::{RenderBackend, RenderError};
use crate::transfer::{FrameBuffer, FrameSize};

/// What happened to a submitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Drawn,
    DroppedSize,
    DrawFailed,
}

/// Backend plus the fixed video size it was created for
pub struct RenderSurfaceContext<B: RenderBackend> {
    backend: B,
    size: FrameSize,
}

impl<B: RenderBackend> RenderSurfaceContext<B> {
    pub fn create(surface: B::Surface, size: FrameSize) -> Result<Self, RenderError> {
        if size.is_empty() || size.checked_byte_len().is_none() {
            return Err(RenderError::InvalidSize(size));
        }
        let backend = B::create(surface, size)?;
        Ok(Self { backend, size })
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    /// Upload and draw one frame, or drop it if it does not fit the texture
    pub fn submit(&mut self, frame: FrameBuffer, stats: &WorkerStats) -> FrameOutcome {
        if !frame.fits(self.size) {
            log::debug!(
                "Dropping frame of {} bytes (announced {:?}), expected {} for {}",
                frame.len(),
                frame.announced_size(),
                self.size.byte_len(),
                self.size
            );
            stats.record_dropped_size();
            return FrameOutcome::DroppedSize;
        }

        let result = self
            .backend
            .upload(&frame)
            .and_then(|_| self.backend.draw());

        match result {
            Ok(()) => {
                stats.record_drawn();
                FrameOutcome::Drawn
            }
            Err(RenderError::SurfaceLost) => {
                log::warn!("Surface lost, reconfigured; frame skipped");
                stats.record_draw_error();
                FrameOutcome::DrawFailed
            }
            Err(e) => {
                log::error!("Failed to present frame: {}", e);
                stats.record_draw_error();
                FrameOutcome::DrawFailed
            }
        }
    }

    pub fn resize_surface(&mut self, width: u32, height: u32) {
        if let Err(e) = self.backend.resize_surface(width, height) {
            log::warn!("Failed to resize surface to {}x{}: {}", width, height, e);
        }
    }
}
