//! Render module for presenting streamed frames
//!
//! The render worker drives a [`RenderBackend`]: one fixed-size texture, one
//! fullscreen quad, one draw per accepted frame.

mod gpu;
mod pipeline;
mod software;

pub use gpu::{PresentTarget, WgpuBackend};
pub use pipeline::{FramePipeline, RenderTarget, FRAME_TEXTURE_FORMAT};
pub use software::{SoftwareBackend, SoftwareSurface};

use crate::transfer::{FrameBuffer, FrameSize};
use thiserror::Error;

/// Errors that can occur while setting up or driving a renderer
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("no compatible GPU adapter available")]
    NoAdapter,
    #[error("failed to create surface: {0}")]
    Surface(String),
    #[error("failed to create device: {0}")]
    Device(String),
    #[error("shader compilation failed: {0}")]
    Shader(String),
    #[error("invalid frame size {0}")]
    InvalidSize(FrameSize),
    #[error("frame of {actual} bytes does not fit a {expected} texture")]
    FrameMismatch { expected: FrameSize, actual: usize },
    #[error("surface lost or outdated")]
    SurfaceLost,
    #[error("failed to draw frame: {0}")]
    Draw(String),
}

/// A renderer owned by the render worker.
///
/// Implementations allocate their texture once in [`RenderBackend::create`]
/// and must never reallocate it afterwards.
pub trait RenderBackend: Sized + Send {
    /// Drawable handed over by the `init` message
    type Surface: Send + 'static;

    /// Build the context, compile the program and allocate the texture
    fn create(surface: Self::Surface, size: FrameSize) -> Result<Self, RenderError>;

    /// Copy a full frame into the existing texture
    fn upload(&mut self, frame: &FrameBuffer) -> Result<(), RenderError>;

    /// Draw the textured quad over the whole surface and present it
    fn draw(&mut self) -> Result<(), RenderError>;

    /// Reconfigure the drawable after the window changed size.
    ///
    /// The frame texture keeps its dimensions.
    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), RenderError>;
}

/// Vertex format for the frame quad
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            },
            wgpu::VertexAttribute {
                offset: 8,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };

    pub fn new(position: [f32; 2], uv: [f32; 2]) -> Self {
        Self { position, uv }
    }
}

/// Two triangles covering clip space, UV origin at the top-left
pub fn fullscreen_quad() -> [Vertex; 6] {
    [
        Vertex::new([-1.0, -1.0], [0.0, 1.0]),
        Vertex::new([1.0, -1.0], [1.0, 1.0]),
        Vertex::new([1.0, 1.0], [1.0, 0.0]),
        Vertex::new([-1.0, -1.0], [0.0, 1.0]),
        Vertex::new([1.0, 1.0], [1.0, 0.0]),
        Vertex::new([-1.0, 1.0], [0.0, 0.0]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_covers_clip_space() {
        let quad = fullscreen_quad();
        let min_x = quad.iter().map(|v| v.position[0]).fold(f32::MAX, f32::min);
        let max_y = quad.iter().map(|v| v.position[1]).fold(f32::MIN, f32::max);
        assert_eq!(min_x, -1.0);
        assert_eq!(max_y, 1.0);

        // Top of clip space samples the first texture row
        for v in quad.iter().filter(|v| v.position[1] == 1.0) {
            assert_eq!(v.uv[1], 0.0);
        }
    }

    #[test]
    fn test_vertex_stride() {
        assert_eq!(Vertex::LAYOUT.array_stride, 16);
        assert_eq!(bytemuck::cast_slice::<Vertex, u8>(&fullscreen_quad()).len(), 96);
    }
}
