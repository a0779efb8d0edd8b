//! Playback control
//!
//! The controller keeps play/pause state and a progress fraction, and turns
//! user intents into calls on whichever [`MediaControl`] is active (a local
//! player or a remote stream). It never touches the render worker: control
//! flows to the media source, frames flow from the source to the renderer.

mod local;
mod raw;

pub use local::{LocalControl, LocalPlayer, PlayerEvent};
pub use raw::RawVideo;

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("no media loaded")]
    NoMedia,
    #[error("media source disconnected")]
    Disconnected,
    #[error("seek failed: {0}")]
    Seek(String),
    #[error("failed to load media: {0}")]
    Load(String),
}

/// Something that can be played, paused and sought
pub trait MediaControl: Send {
    /// Jump to `fraction` of the media, already clamped to `[0, 1]`
    fn seek(&mut self, fraction: f64) -> Result<(), PlaybackError>;

    fn set_playing(&mut self, playing: bool) -> Result<(), PlaybackError>;
}

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Play/pause/seek state for the preview
#[derive(Default)]
pub struct PlaybackController {
    control: Option<Box<dyn MediaControl>>,
    state: PlaybackState,
    /// Progress in `[0, 1]`
    progress: f64,
    /// Duration in seconds, for sources that report timestamps
    duration: Option<f64>,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route intents to a new media source.
    ///
    /// `duration` is only needed for sources that report progress through
    /// [`Self::on_frame_timestamp`].
    pub fn attach(&mut self, control: Box<dyn MediaControl>, duration: Option<f64>, playing: bool) {
        self.control = Some(control);
        self.duration = duration.filter(|d| *d > 0.0);
        self.progress = 0.0;
        self.state = if playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        };
    }

    /// Forget the current media source
    pub fn detach(&mut self) {
        self.control = None;
        self.duration = None;
        self.progress = 0.0;
        self.state = PlaybackState::Stopped;
    }

    pub fn has_media(&self) -> bool {
        self.control.is_some()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// A local source reached `time` seconds
    pub fn on_frame_timestamp(&mut self, time: f64) {
        if let Some(duration) = self.duration {
            self.progress = clamp_fraction(time / duration);
        }
    }

    /// The remote source reported its position
    pub fn on_remote_position(&mut self, fraction: f64) {
        self.progress = clamp_fraction(fraction);
    }

    /// Seek the active source to `fraction`.
    ///
    /// Failures are logged and leave playback paused; they are never fatal.
    pub fn seek(&mut self, fraction: f64) -> Result<(), PlaybackError> {
        let fraction = clamp_fraction(fraction);
        let result = match self.control.as_mut() {
            Some(control) => control.seek(fraction),
            None => Err(PlaybackError::NoMedia),
        };

        match &result {
            Ok(()) => self.progress = fraction,
            Err(e) => {
                log::warn!("Seek to {:.3} failed: {}", fraction, e);
                self.stop_on_failure();
            }
        }
        result
    }

    pub fn set_playing(&mut self, playing: bool) -> Result<(), PlaybackError> {
        let result = match self.control.as_mut() {
            Some(control) => control.set_playing(playing),
            None => Err(PlaybackError::NoMedia),
        };

        match &result {
            Ok(()) => {
                self.state = if playing {
                    PlaybackState::Playing
                } else {
                    PlaybackState::Paused
                };
            }
            Err(e) => {
                log::warn!("Failed to {}: {}", if playing { "play" } else { "pause" }, e);
                self.stop_on_failure();
            }
        }
        result
    }

    pub fn toggle_playing(&mut self) -> Result<(), PlaybackError> {
        self.set_playing(!self.is_playing())
    }

    fn stop_on_failure(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }
}

/// Clamp to `[0, 1]`, treating NaN as the start
pub fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Frame index shown for a position `fraction` of a clip of `frame_count` frames
pub fn frame_index_at(fraction: f64, frame_count: usize) -> usize {
    if frame_count == 0 {
        return 0;
    }
    let index = (clamp_fraction(fraction) * (frame_count as f64 - 0.5)).round() as usize;
    index.min(frame_count - 1)
}

/// Position of frame `index` as a fraction of the clip
pub fn frame_position(index: usize, frame_count: usize) -> f64 {
    if frame_count == 0 {
        0.0
    } else {
        index.min(frame_count) as f64 / frame_count as f64
    }
}

/// Time between frames at `fps`.
///
/// `None` unless the rate is finite, positive and gives a non-zero
/// representable interval.
pub fn frame_interval(fps: f64) -> Option<Duration> {
    if !(fps.is_finite() && fps > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps)
        .ok()
        .filter(|interval| !interval.is_zero())
}

/// Format time as MM:SS.FF
pub fn format_time(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let mins = (seconds / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    let hundredths = ((seconds % 1.0) * 100.0) as u32;
    format!("{:02}:{:02}.{:02}", mins, secs, hundredths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        seeks: Vec<f64>,
        playing: Vec<bool>,
    }

    struct FakeControl {
        log: Arc<Mutex<Recorded>>,
        fail: bool,
    }

    impl MediaControl for FakeControl {
        fn seek(&mut self, fraction: f64) -> Result<(), PlaybackError> {
            if self.fail {
                return Err(PlaybackError::Seek("unreachable".to_string()));
            }
            self.log.lock().unwrap().seeks.push(fraction);
            Ok(())
        }

        fn set_playing(&mut self, playing: bool) -> Result<(), PlaybackError> {
            if self.fail {
                return Err(PlaybackError::Disconnected);
            }
            self.log.lock().unwrap().playing.push(playing);
            Ok(())
        }
    }

    fn controller(fail: bool) -> (PlaybackController, Arc<Mutex<Recorded>>) {
        let log = Arc::new(Mutex::new(Recorded::default()));
        let mut controller = PlaybackController::new();
        controller.attach(
            Box::new(FakeControl {
                log: Arc::clone(&log),
                fail,
            }),
            Some(10.0),
            true,
        );
        (controller, log)
    }

    #[test]
    fn test_seek_is_clamped_and_forwarded() {
        let (mut controller, log) = controller(false);
        controller.seek(1.7).unwrap();
        controller.seek(-0.2).unwrap();
        controller.seek(0.25).unwrap();

        assert_eq!(log.lock().unwrap().seeks, vec![1.0, 0.0, 0.25]);
        assert_eq!(controller.progress(), 0.25);
    }

    #[test]
    fn test_failed_seek_pauses() {
        let (mut controller, _log) = controller(true);
        assert!(controller.is_playing());

        assert!(controller.seek(0.5).is_err());
        assert_eq!(controller.state(), PlaybackState::Paused);
        assert_eq!(controller.progress(), 0.0);
    }

    #[test]
    fn test_seek_without_media() {
        let mut controller = PlaybackController::new();
        assert_eq!(controller.seek(0.5), Err(PlaybackError::NoMedia));
        assert_eq!(controller.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_progress_sources() {
        let (mut controller, _log) = controller(false);
        controller.on_frame_timestamp(2.5);
        assert_eq!(controller.progress(), 0.25);

        controller.on_remote_position(1.5);
        assert_eq!(controller.progress(), 1.0);
    }

    #[test]
    fn test_toggle_playing() {
        let (mut controller, log) = controller(false);
        controller.toggle_playing().unwrap();
        assert_eq!(controller.state(), PlaybackState::Paused);
        controller.toggle_playing().unwrap();
        assert!(controller.is_playing());
        assert_eq!(log.lock().unwrap().playing, vec![false, true]);
    }

    #[test]
    fn test_frame_index_at() {
        assert_eq!(frame_index_at(0.0, 10), 0);
        assert_eq!(frame_index_at(0.5, 10), 5);
        assert_eq!(frame_index_at(1.0, 10), 9);
        assert_eq!(frame_index_at(0.5, 0), 0);
        assert_eq!(frame_position(5, 10), 0.5);
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(frame_interval(4.0), Some(Duration::from_millis(250)));
        assert_eq!(frame_interval(0.0), None);
        assert_eq!(frame_interval(f64::NAN), None);
        assert_eq!(frame_interval(1e-30), None);
        assert_eq!(frame_interval(1e300), None);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "00:00.00");
        assert_eq!(format_time(75.5), "01:15.50");
    }
}
