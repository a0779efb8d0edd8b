//! Local raw clip player
//!
//! Plays a [`RawVideo`] on its own thread at a fixed frame rate, looping at the
//! end, and feeds every shown frame into a [`FrameSink`].

use super::{frame_index_at, frame_interval, frame_position, MediaControl, PlaybackError, RawVideo};
use crate::stream::FrameSink;
use crate::transfer::{TransferError, Transferable};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Commands sent to the player thread
#[derive(Debug)]
enum PlayerCommand {
    Play,
    Pause,
    Seek(f64),
    /// Move by this many frames, wrapping around the clip
    Step(i64),
    Stop,
}

/// Events from the player thread
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Frame `index` was handed to the sink
    Position { index: usize, time: f64, fraction: f64 },
    /// The sink refused frames; the player stopped
    Error(String),
}

/// Handle to a running local player
pub struct LocalPlayer {
    command_tx: Sender<PlayerCommand>,
    event_rx: Receiver<PlayerEvent>,
    thread: Option<JoinHandle<()>>,
    frame_count: usize,
    fps: f64,
}

impl LocalPlayer {
    /// Start playing `video` into `sink`.
    ///
    /// The first frame is shown right away, paused or not.
    pub fn start<K: FrameSink>(
        video: RawVideo,
        fps: f64,
        sink: K,
        playing: bool,
    ) -> Result<Self, PlaybackError> {
        let interval =
            frame_interval(fps).ok_or_else(|| PlaybackError::Load(format!("invalid frame rate {}", fps)))?;

        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = bounded(64);
        let frame_count = video.frame_count();

        let player = PlayerLoop {
            video,
            sink,
            interval,
            fps,
            index: 0,
            playing,
            event_tx,
        };

        let thread = thread::Builder::new()
            .name("local-player".into())
            .spawn(move || player.run(command_rx))
            .map_err(|e| PlaybackError::Load(e.to_string()))?;

        Ok(Self {
            command_tx,
            event_rx,
            thread: Some(thread),
            frame_count,
            fps,
        })
    }

    pub fn control(&self) -> LocalControl {
        LocalControl {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Move by `delta` frames, wrapping at either end
    pub fn step(&self, delta: i64) {
        let _ = self.command_tx.send(PlayerCommand::Step(delta));
    }

    pub fn poll_events(&self) -> Vec<PlayerEvent> {
        self.event_rx.try_iter().collect()
    }

    pub fn wait_event(&self, timeout: Duration) -> Option<PlayerEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Clip duration in seconds
    pub fn duration(&self) -> f64 {
        self.frame_count as f64 / self.fps
    }

    /// Stop the player thread; no frame is produced afterwards
    pub fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.command_tx.send(PlayerCommand::Stop);
            if thread.join().is_err() {
                log::error!("Local player thread panicked");
            }
        }
    }
}

impl Drop for LocalPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// [`MediaControl`] for a [`LocalPlayer`]
#[derive(Debug, Clone)]
pub struct LocalControl {
    command_tx: Sender<PlayerCommand>,
}

impl MediaControl for LocalControl {
    fn seek(&mut self, fraction: f64) -> Result<(), PlaybackError> {
        self.command_tx
            .send(PlayerCommand::Seek(fraction))
            .map_err(|_| PlaybackError::Disconnected)
    }

    fn set_playing(&mut self, playing: bool) -> Result<(), PlaybackError> {
        let command = if playing { PlayerCommand::Play } else { PlayerCommand::Pause };
        self.command_tx.send(command).map_err(|_| PlaybackError::Disconnected)
    }
}

struct PlayerLoop<K> {
    video: RawVideo,
    sink: K,
    interval: Duration,
    fps: f64,
    index: usize,
    playing: bool,
    event_tx: Sender<PlayerEvent>,
}

impl<K: FrameSink> PlayerLoop<K> {
    fn run(mut self, command_rx: Receiver<PlayerCommand>) {
        log::info!(
            "Local player started: {} frames of {} at {} fps",
            self.video.frame_count(),
            self.video.size(),
            self.fps
        );

        if let Err(e) = self.sink.start(self.video.size()) {
            self.emit(PlayerEvent::Error(e.to_string()));
            return;
        }
        if self.present().is_err() {
            return;
        }

        let mut next_due = Instant::now() + self.interval;
        loop {
            let command = if self.playing {
                let now = Instant::now();
                if next_due <= now {
                    self.index = (self.index + 1) % self.video.frame_count();
                    if self.present().is_err() {
                        break;
                    }
                    next_due += self.interval;
                    if next_due < now {
                        // Fell behind; skip the backlog instead of bursting
                        next_due = now + self.interval;
                    }
                    continue;
                }
                command_rx.recv_timeout(next_due - now)
            } else {
                command_rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
            };

            let shown = match command {
                Ok(PlayerCommand::Play) => {
                    self.playing = true;
                    next_due = Instant::now() + self.interval;
                    Ok(())
                }
                Ok(PlayerCommand::Pause) => {
                    self.playing = false;
                    Ok(())
                }
                Ok(PlayerCommand::Seek(fraction)) => {
                    self.index = frame_index_at(fraction, self.video.frame_count());
                    next_due = Instant::now() + self.interval;
                    self.present()
                }
                Ok(PlayerCommand::Step(delta)) => {
                    let count = self.video.frame_count() as i64;
                    self.index = (self.index as i64 + delta).rem_euclid(count) as usize;
                    self.present()
                }
                Ok(PlayerCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => Ok(()),
            };

            if shown.is_err() {
                break;
            }
        }

        log::info!("Local player stopped");
    }

    fn present(&mut self) -> Result<(), TransferError> {
        let mut frame = Transferable::new(self.video.frame(self.index));
        if let Err(e) = self.sink.frame(&mut frame) {
            log::warn!("Local player stopping: {}", e);
            self.emit(PlayerEvent::Error(e.to_string()));
            return Err(e);
        }

        self.emit(PlayerEvent::Position {
            index: self.index,
            time: self.index as f64 / self.fps,
            fraction: frame_position(self.index, self.video.frame_count()),
        });
        Ok(())
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.event_tx.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::sink::testing::{RecordingSink, SinkEvent};
    use crate::transfer::FrameSize;
    use bytes::Bytes;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Four 1x1 frames, frame `i` filled with `i`
    fn clip() -> RawVideo {
        let data: Vec<u8> = (0..4u8).flat_map(|i| [i; 4]).collect();
        RawVideo::from_bytes(Bytes::from(data), FrameSize::new(1, 1)).unwrap()
    }

    fn next_frame(rx: &Receiver<SinkEvent>) -> u8 {
        match rx.recv_timeout(TIMEOUT) {
            Ok(SinkEvent::Frame(bytes)) => bytes[0],
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn test_paused_player_seeks_and_steps() {
        let (tx, rx) = unbounded();
        let player = LocalPlayer::start(clip(), 30.0, RecordingSink(tx), false).unwrap();

        assert_eq!(rx.recv_timeout(TIMEOUT), Ok(SinkEvent::Start(FrameSize::new(1, 1))));
        assert_eq!(next_frame(&rx), 0);

        let mut control = player.control();
        control.seek(0.5).unwrap();
        assert_eq!(next_frame(&rx), 2);

        player.step(-3);
        assert_eq!(next_frame(&rx), 3);
        player.step(1);
        assert_eq!(next_frame(&rx), 0);

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_playing_player_loops() {
        let (tx, rx) = unbounded();
        let _player = LocalPlayer::start(clip(), 500.0, RecordingSink(tx), true).unwrap();

        assert!(matches!(rx.recv_timeout(TIMEOUT), Ok(SinkEvent::Start(_))));
        let shown: Vec<u8> = (0..6).map(|_| next_frame(&rx)).collect();
        assert_eq!(shown, vec![0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn test_position_events() {
        let (tx, _rx) = unbounded();
        let player = LocalPlayer::start(clip(), 4.0, RecordingSink(tx), false).unwrap();
        assert_eq!(player.duration(), 1.0);

        assert_eq!(
            player.wait_event(TIMEOUT),
            Some(PlayerEvent::Position {
                index: 0,
                time: 0.0,
                fraction: 0.0
            })
        );

        player.control().seek(1.0).unwrap();
        assert_eq!(
            player.wait_event(TIMEOUT),
            Some(PlayerEvent::Position {
                index: 3,
                time: 0.75,
                fraction: 0.75
            })
        );
    }

    #[test]
    fn test_stop_ends_production() {
        let (tx, rx) = unbounded();
        let mut player = LocalPlayer::start(clip(), 200.0, RecordingSink(tx), true).unwrap();
        assert!(matches!(rx.recv_timeout(TIMEOUT), Ok(SinkEvent::Start(_))));

        player.stop();
        while rx.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_fps_rejected() {
        let (tx, _rx) = unbounded();
        assert!(LocalPlayer::start(clip(), 0.0, RecordingSink(tx.clone()), true).is_err());
        assert!(LocalPlayer::start(clip(), 1e-30, RecordingSink(tx), true).is_err());
    }
}
