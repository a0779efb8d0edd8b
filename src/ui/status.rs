//! Host events and the one-line status shown in the window title.

use crate::playback::{format_time, PlaybackState};
use crate::stream::ConnectionState;
use std::path::{Path, PathBuf};

/// Notifications from the host window
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Paths dropped onto the window
    FilesDropped(Vec<PathBuf>),
    /// Full reload requested
    Refresh,
    /// Percentage of an external conversion job
    ConversionProgress(f32),
}

impl HostEvent {
    /// The file to load, when exactly one path was dropped
    pub fn dropped_file(&self) -> Option<&Path> {
        match self {
            HostEvent::FilesDropped(paths) if paths.len() == 1 => Some(&paths[0]),
            _ => None,
        }
    }
}

/// Where frames currently come from
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SourceStatus {
    #[default]
    None,
    Stream(ConnectionState),
    File(String),
}

/// Everything the status line reports
#[derive(Debug, Clone, Default)]
pub struct StatusLine {
    pub source: SourceStatus,
    pub playback: PlaybackState,
    pub progress: f64,
    /// Media duration in seconds, when known
    pub duration: Option<f64>,
    /// Set when the renderer could not start
    pub renderer_error: Option<String>,
    /// Last load or connect failure
    pub notice: Option<String>,
    conversion: Option<f32>,
}

impl StatusLine {
    pub fn set_conversion_progress(&mut self, percent: f32) {
        self.conversion = if percent.is_finite() && percent < 100.0 {
            Some(percent.max(0.0))
        } else {
            None
        };
    }

    pub fn text(&self) -> String {
        let mut parts = Vec::new();

        if let Some(error) = &self.renderer_error {
            parts.push(format!("Rendering unsupported: {}", error));
        }
        if let Some(notice) = &self.notice {
            parts.push(notice.clone());
        }

        match &self.source {
            SourceStatus::None => parts.push("No media".to_string()),
            SourceStatus::Stream(state) => parts.push(state.to_string()),
            SourceStatus::File(name) => parts.push(name.clone()),
        }

        if self.source != SourceStatus::None {
            let state = match self.playback {
                PlaybackState::Playing => "Playing",
                PlaybackState::Paused => "Paused",
                PlaybackState::Stopped => "Stopped",
            };
            let position = match self.duration {
                Some(duration) => format!(
                    "{} / {}",
                    format_time(self.progress * duration),
                    format_time(duration)
                ),
                None => format!("{:.0}%", self.progress * 100.0),
            };
            parts.push(format!("{} {}", state, position));
        }

        if let Some(percent) = self.conversion {
            parts.push(format!("Converting {:.0}%", percent));
        }

        parts.join(" | ")
    }
}
