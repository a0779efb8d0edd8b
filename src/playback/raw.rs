//! Raw RGBA8 clips: frames stored back to back with no container.

use super::PlaybackError;
use crate::transfer::FrameSize;
use bytes::Bytes;
use std::path::Path;

/// In-memory raw clip
#[derive(Debug, Clone)]
pub struct RawVideo {
    data: Bytes,
    size: FrameSize,
    frame_count: usize,
}

impl RawVideo {
    /// Load a raw file whose frames are all `size`
    pub fn open(path: &Path, size: FrameSize) -> Result<Self, PlaybackError> {
        log::info!("Loading raw video: {:?} ({})", path, size);
        let data = std::fs::read(path).map_err(|e| PlaybackError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_bytes(Bytes::from(data), size)
    }

    pub fn from_bytes(data: Bytes, size: FrameSize) -> Result<Self, PlaybackError> {
        let frame_len = match size.checked_byte_len() {
            Some(len) if len > 0 => len,
            _ => return Err(PlaybackError::Load(format!("invalid frame size {}", size))),
        };

        let frame_count = data.len() / frame_len;
        if frame_count == 0 {
            return Err(PlaybackError::Load(format!(
                "{} bytes hold no complete {} frame",
                data.len(),
                size
            )));
        }

        let trailing = data.len() % frame_len;
        if trailing != 0 {
            log::warn!("Ignoring {} trailing bytes after {} frames", trailing, frame_count);
        }

        Ok(Self {
            data,
            size,
            frame_count,
        })
    }

    /// Moving gradient with a bright bar sweeping left to right
    pub fn test_pattern(size: FrameSize, frame_count: usize) -> Self {
        let frame_count = frame_count.max(1);
        let width = size.width.max(1) as usize;
        let height = size.height.max(1) as usize;
        let size = FrameSize::new(width as u32, height as u32);

        let mut data = Vec::with_capacity(size.byte_len() * frame_count);
        for frame in 0..frame_count {
            let bar = frame * width / frame_count;
            for y in 0..height {
                for x in 0..width {
                    if x == bar {
                        data.extend_from_slice(&[255, 255, 255, 255]);
                    } else {
                        let r = (x * 255 / width) as u8;
                        let g = (y * 255 / height) as u8;
                        let b = (frame * 255 / frame_count) as u8;
                        data.extend_from_slice(&[r, g, b, 255]);
                    }
                }
            }
        }

        Self {
            data: Bytes::from(data),
            size,
            frame_count,
        }
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Duration in seconds at `fps`
    pub fn duration(&self, fps: f64) -> f64 {
        if fps > 0.0 {
            self.frame_count as f64 / fps
        } else {
            0.0
        }
    }

    /// Pixels of frame `index`, sharing the clip's memory
    pub fn frame(&self, index: usize) -> Bytes {
        let len = self.size.byte_len();
        let start = index.min(self.frame_count - 1) * len;
        self.data.slice(start..start + len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_split_by_size() {
        let size = FrameSize::new(1, 1);
        let data: Vec<u8> = (0..10).collect();
        let video = RawVideo::from_bytes(Bytes::from(data), size).unwrap();

        assert_eq!(video.frame_count(), 2);
        assert_eq!(&video.frame(1)[..], &[4, 5, 6, 7]);
        assert_eq!(&video.frame(9)[..], &[4, 5, 6, 7]);
        assert_eq!(video.duration(4.0), 0.5);
    }

    #[test]
    fn test_short_file_rejected() {
        let err = RawVideo::from_bytes(Bytes::from(vec![0u8; 3]), FrameSize::new(1, 1)).unwrap_err();
        assert!(matches!(err, PlaybackError::Load(_)));
    }

    #[test]
    fn test_pattern_frames_differ() {
        let video = RawVideo::test_pattern(FrameSize::new(8, 4), 4);
        assert_eq!(video.frame_count(), 4);
        assert_eq!(video.frame(0).len(), FrameSize::new(8, 4).byte_len());
        assert_ne!(video.frame(0), video.frame(1));
    }

    #[test]
    fn test_open_missing_file() {
        let err = RawVideo::open(Path::new("/nonexistent/clip.rgba"), FrameSize::new(2, 2)).unwrap_err();
        assert!(err.to_string().contains("clip.rgba"));
    }
}
