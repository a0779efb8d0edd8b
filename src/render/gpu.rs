//! wgpu backend for the render worker
//!
//! Presents either into a window surface or into an offscreen texture that can
//! be read back.

use super::{FramePipeline, RenderBackend, RenderError, RenderTarget, FRAME_TEXTURE_FORMAT};
use crate::transfer::{FrameBuffer, FrameSize, BYTES_PER_PIXEL};
use std::sync::Arc;
use winit::window::Window;

/// Where the worker presents its frames
pub enum PresentTarget {
    /// A window surface
    Window(Arc<Window>),
    /// An offscreen texture of the given size
    Offscreen { width: u32, height: u32 },
}

impl std::fmt::Debug for PresentTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PresentTarget::Window(window) => f.debug_tuple("Window").field(&window.id()).finish(),
            PresentTarget::Offscreen { width, height } => f
                .debug_struct("Offscreen")
                .field("width", width)
                .field("height", height)
                .finish(),
        }
    }
}

/// Drawable owned by the backend
enum Presenter {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        /// Linear format the pipeline renders into
        view_format: wgpu::TextureFormat,
    },
    Offscreen(RenderTarget),
}

/// GPU renderer living on the render worker thread
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    presenter: Presenter,
    pipeline: FramePipeline,
}

impl WgpuBackend {
    fn request_device(
        adapter: &wgpu::Adapter,
    ) -> Result<(wgpu::Device, wgpu::Queue), RenderError> {
        pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Stream Preview Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            },
            None,
        ))
        .map_err(|e| RenderError::Device(e.to_string()))
    }

    fn build(surface: PresentTarget, size: FrameSize, shader: Option<&str>) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let (device, queue, presenter) = match surface {
            PresentTarget::Window(window) => {
                let inner = window.inner_size();
                let surface = instance
                    .create_surface(window)
                    .map_err(|e| RenderError::Surface(e.to_string()))?;

                let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: Some(&surface),
                    force_fallback_adapter: false,
                }))
                .ok_or(RenderError::NoAdapter)?;

                log::info!("Using GPU adapter: {}", adapter.get_info().name);
                let (device, queue) = Self::request_device(&adapter)?;

                let mut config = surface
                    .get_default_config(&adapter, inner.width.max(1), inner.height.max(1))
                    .ok_or_else(|| RenderError::Surface("surface is not supported by the adapter".to_string()))?;

                // Frames are already encoded; an sRGB target would encode them twice
                let formats = surface.get_capabilities(&adapter).formats;
                let (format, view_format) = linear_output_format(&formats, config.format);
                config.format = format;
                if view_format != format {
                    config.view_formats = vec![view_format];
                }
                surface.configure(&device, &config);

                (
                    device,
                    queue,
                    Presenter::Window {
                        surface,
                        config,
                        view_format,
                    },
                )
            }
            PresentTarget::Offscreen { width, height } => {
                let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                }))
                .ok_or(RenderError::NoAdapter)?;

                log::info!("Using GPU adapter for offscreen output: {}", adapter.get_info().name);
                let (device, queue) = Self::request_device(&adapter)?;

                let target = RenderTarget::new(&device, width.max(1), height.max(1), FRAME_TEXTURE_FORMAT);
                (device, queue, Presenter::Offscreen(target))
            }
        };

        let target_format = match &presenter {
            Presenter::Window { view_format, .. } => *view_format,
            Presenter::Offscreen(target) => target.format,
        };

        let pipeline = match shader {
            Some(source) => FramePipeline::with_shader(&device, target_format, size, source)?,
            None => FramePipeline::new(&device, target_format, size)?,
        };

        log::info!("Frame pipeline ready: {} texture, {:?} output", size, target_format);

        Ok(Self {
            device,
            queue,
            presenter,
            pipeline,
        })
    }

    /// Copy the offscreen target back to tightly packed RGBA8 rows.
    ///
    /// Returns `None` when presenting to a window.
    pub fn read_pixels(&self) -> Option<Vec<u8>> {
        let Presenter::Offscreen(target) = &self.presenter else {
            return None;
        };

        let unpadded_bytes_per_row = target.width * BYTES_PER_PIXEL as u32;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_bytes_per_row * target.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(target.height),
                },
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv().ok()?.ok()?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * target.height) as usize);
        for row in mapped.chunks(padded_bytes_per_row as usize) {
            pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
        }
        drop(mapped);
        staging.unmap();

        Some(pixels)
    }

    #[cfg(test)]
    pub(crate) fn create_with_shader(
        surface: PresentTarget,
        size: FrameSize,
        shader: &str,
    ) -> Result<Self, RenderError> {
        Self::build(surface, size, Some(shader))
    }
}

impl RenderBackend for WgpuBackend {
    type Surface = PresentTarget;

    fn create(surface: PresentTarget, size: FrameSize) -> Result<Self, RenderError> {
        Self::build(surface, size, None)
    }

    fn upload(&mut self, frame: &FrameBuffer) -> Result<(), RenderError> {
        self.pipeline.upload(&self.queue, frame)
    }

    fn draw(&mut self) -> Result<(), RenderError> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        match &mut self.presenter {
            Presenter::Window {
                surface,
                config,
                view_format,
            } => {
                let frame = match surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        surface.configure(&self.device, config);
                        return Err(RenderError::SurfaceLost);
                    }
                    Err(e) => return Err(RenderError::Draw(e.to_string())),
                };
                let view = frame.texture.create_view(&wgpu::TextureViewDescriptor {
                    format: Some(*view_format),
                    ..Default::default()
                });

                self.pipeline.encode_draw(&mut encoder, &view);
                self.queue.submit(Some(encoder.finish()));
                frame.present();
            }
            Presenter::Offscreen(target) => {
                self.pipeline.encode_draw(&mut encoder, &target.view);
                self.queue.submit(Some(encoder.finish()));
            }
        }

        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Ok(());
        }

        match &mut self.presenter {
            Presenter::Window { surface, config, .. } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            Presenter::Offscreen(target) => target.resize(&self.device, width, height),
        }
        Ok(())
    }
}

/// Pick a surface format that stores frame bytes unchanged.
///
/// Returns the surface format and the view format to render into. A linear
/// format is preferred; otherwise the sRGB `fallback` is viewed as linear.
fn linear_output_format(
    formats: &[wgpu::TextureFormat],
    fallback: wgpu::TextureFormat,
) -> (wgpu::TextureFormat, wgpu::TextureFormat) {
    match formats.iter().find(|format| !format.is_srgb()) {
        Some(&format) => (format, format),
        None => (fallback, fallback.remove_srgb_suffix()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::TextureFormat;

    #[test]
    fn test_window_output_avoids_srgb() {
        let formats = [TextureFormat::Bgra8UnormSrgb, TextureFormat::Bgra8Unorm];
        assert_eq!(
            linear_output_format(&formats, TextureFormat::Bgra8UnormSrgb),
            (TextureFormat::Bgra8Unorm, TextureFormat::Bgra8Unorm)
        );

        // Only sRGB offered: keep it but render through a linear view
        assert_eq!(
            linear_output_format(&[TextureFormat::Rgba8UnormSrgb], TextureFormat::Rgba8UnormSrgb),
            (TextureFormat::Rgba8UnormSrgb, TextureFormat::Rgba8Unorm)
        );
    }

    fn offscreen(size: FrameSize) -> Option<WgpuBackend> {
        match WgpuBackend::create(
            PresentTarget::Offscreen {
                width: size.width,
                height: size.height,
            },
            size,
        ) {
            Ok(backend) => Some(backend),
            Err(RenderError::NoAdapter | RenderError::Device(_)) => {
                eprintln!("skipping: no usable GPU adapter");
                None
            }
            Err(e) => panic!("unexpected init failure: {e}"),
        }
    }

    #[test]
    fn test_offscreen_draw_shows_uploaded_frame() {
        let size = FrameSize::new(4, 4);
        let Some(mut backend) = offscreen(size) else {
            return;
        };

        let pixels: Vec<u8> = (0..size.byte_len()).map(|i| (i % 4 * 60) as u8 | 0x0f).collect();
        backend.upload(&FrameBuffer::from_vec(pixels.clone())).unwrap();
        backend.draw().unwrap();

        // Same size target, so linear filtering samples texel centres exactly
        assert_eq!(backend.read_pixels().unwrap(), pixels);
    }

    #[test]
    fn test_upload_rejects_wrong_length() {
        let size = FrameSize::new(4, 4);
        let Some(mut backend) = offscreen(size) else {
            return;
        };

        let err = backend.upload(&FrameBuffer::from_vec(vec![0; 10])).unwrap_err();
        assert!(matches!(err, RenderError::FrameMismatch { actual: 10, .. }));
    }

    #[test]
    fn test_broken_shader_is_reported() {
        let size = FrameSize::new(4, 4);
        let result = WgpuBackend::create_with_shader(
            PresentTarget::Offscreen { width: 4, height: 4 },
            size,
            "this is not wgsl",
        );
        match result {
            Err(RenderError::Shader(_) | RenderError::NoAdapter | RenderError::Device(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("broken shader accepted"),
        }
    }
}
