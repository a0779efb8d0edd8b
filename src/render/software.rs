//! CPU backend for headless runs
//!
//! Keeps the frame texture in memory and "presents" by copying it into a
//! [`SoftwareSurface`] that other threads may inspect or snapshot.

use super::{RenderBackend, RenderError};
use crate::transfer::{FrameBuffer, FrameSize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct SurfaceState {
    pixels: Vec<u8>,
    size: Option<FrameSize>,
    presents: u64,
    bound: bool,
    viewport: (u32, u32),
}

/// Shared in-memory drawable
#[derive(Debug, Clone, Default)]
pub struct SoftwareSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl SoftwareSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of completed draws
    pub fn presented_count(&self) -> u64 {
        self.lock().presents
    }

    /// Pixels of the most recent draw
    pub fn pixels(&self) -> Option<Vec<u8>> {
        let state = self.lock();
        (state.presents > 0).then(|| state.pixels.clone())
    }

    /// Size of the image last presented
    pub fn frame_size(&self) -> Option<FrameSize> {
        self.lock().size
    }

    /// Whether a renderer currently holds this surface
    pub fn is_bound(&self) -> bool {
        self.lock().bound
    }

    /// Last size reported through a resize
    pub fn viewport(&self) -> (u32, u32) {
        self.lock().viewport
    }

    /// Write the last presented image as a PNG
    pub fn save_png(&self, path: &Path) -> anyhow::Result<()> {
        let state = self.lock();
        let size = state
            .size
            .filter(|_| state.presents > 0)
            .ok_or_else(|| anyhow::anyhow!("nothing has been presented yet"))?;
        let image = image::RgbaImage::from_raw(size.width, size.height, state.pixels.clone())
            .ok_or_else(|| anyhow::anyhow!("presented buffer does not match {}", size))?;
        image.save(path)?;
        log::info!("Saved snapshot to {:?}", path);
        Ok(())
    }
}

/// Renderer that draws into a [`SoftwareSurface`]
#[derive(Debug)]
pub struct SoftwareBackend {
    surface: SoftwareSurface,
    texture: Vec<u8>,
    size: FrameSize,
}

impl RenderBackend for SoftwareBackend {
    type Surface = SoftwareSurface;

    fn create(surface: SoftwareSurface, size: FrameSize) -> Result<Self, RenderError> {
        if size.is_empty() || size.checked_byte_len().is_none() {
            return Err(RenderError::InvalidSize(size));
        }

        {
            let mut state = surface.lock();
            if state.bound {
                return Err(RenderError::Surface("surface is already owned by a renderer".to_string()));
            }
            state.bound = true;
            state.viewport = (size.width, size.height);
        }

        Ok(Self {
            surface,
            texture: vec![0; size.byte_len()],
            size,
        })
    }

    fn upload(&mut self, frame: &FrameBuffer) -> Result<(), RenderError> {
        if !frame.fits(self.size) {
            return Err(RenderError::FrameMismatch {
                expected: self.size,
                actual: frame.len(),
            });
        }
        self.texture.copy_from_slice(frame.as_bytes());
        Ok(())
    }

    fn draw(&mut self) -> Result<(), RenderError> {
        let mut state = self.surface.lock();
        state.pixels.clear();
        state.pixels.extend_from_slice(&self.texture);
        state.size = Some(self.size);
        state.presents += 1;
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width > 0 && height > 0 {
            self.surface.lock().viewport = (width, height);
        }
        Ok(())
    }
}

impl Drop for SoftwareBackend {
    fn drop(&mut self) {
        self.surface.lock().bound = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_presents_texture() {
        let surface = SoftwareSurface::new();
        let size = FrameSize::new(2, 1);
        let mut backend = SoftwareBackend::create(surface.clone(), size).unwrap();
        assert!(surface.is_bound());
        assert_eq!(surface.pixels(), None);

        backend.upload(&FrameBuffer::from_vec(vec![9; 8])).unwrap();
        backend.draw().unwrap();

        assert_eq!(surface.presented_count(), 1);
        assert_eq!(surface.pixels(), Some(vec![9; 8]));
        assert_eq!(surface.frame_size(), Some(size));
    }

    #[test]
    fn test_mismatched_upload_leaves_texture() {
        let surface = SoftwareSurface::new();
        let mut backend = SoftwareBackend::create(surface.clone(), FrameSize::new(1, 1)).unwrap();
        backend.upload(&FrameBuffer::from_vec(vec![1, 2, 3, 4])).unwrap();

        assert!(backend.upload(&FrameBuffer::from_vec(vec![5; 8])).is_err());
        backend.draw().unwrap();
        assert_eq!(surface.pixels(), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_drop_releases_surface() {
        let surface = SoftwareSurface::new();
        let backend = SoftwareBackend::create(surface.clone(), FrameSize::new(1, 1)).unwrap();
        assert!(SoftwareBackend::create(surface.clone(), FrameSize::new(1, 1)).is_err());

        drop(backend);
        assert!(!surface.is_bound());
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = SoftwareBackend::create(SoftwareSurface::new(), FrameSize::new(0, 4)).unwrap_err();
        assert!(matches!(err, RenderError::InvalidSize(_)));
    }
}
