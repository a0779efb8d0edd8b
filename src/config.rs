//! Preview configuration
//!
//! Loaded from a JSON file, overridable from the environment and the command
//! line.

use crate::playback::frame_interval;
use crate::stream::FrameFraming;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the stream URL
pub const URL_ENV: &str = "STREAM_PREVIEW_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// WebSocket frame stream
    Stream {
        url: String,
        #[serde(default)]
        framing: FrameFraming,
    },
    /// Raw RGBA8 file played locally
    File {
        path: PathBuf,
        width: u32,
        height: u32,
        #[serde(default = "default_fps")]
        fps: f64,
    },
}

/// Frame format assumed for raw files opened without a config
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFormat {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl Default for RawFormat {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            fps: default_fps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Stream Preview".to_string(),
            width: 960,
            height: 600,
        }
    }
}

/// Renderer used by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Gpu,
    /// CPU renderer; nothing is shown in the window
    Software,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub source: Option<SourceConfig>,
    pub raw_format: RawFormat,
    pub window: WindowConfig,
    pub backend: BackendKind,
    /// Start playing as soon as media is loaded
    pub autoplay: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            source: None,
            raw_format: RawFormat::default(),
            window: WindowConfig::default(),
            backend: BackendKind::default(),
            autoplay: true,
        }
    }
}

fn default_fps() -> f64 {
    30.0
}

/// What the first command-line argument asks for
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchTarget {
    Config(PathBuf),
    Stream(String),
    File(PathBuf),
    /// No argument: ask the user
    Pick,
}

impl LaunchTarget {
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None => LaunchTarget::Pick,
            Some(arg) if is_stream_url(arg) => LaunchTarget::Stream(arg.to_string()),
            Some(arg) if arg.ends_with(".json") => LaunchTarget::Config(PathBuf::from(arg)),
            Some(arg) => LaunchTarget::File(PathBuf::from(arg)),
        }
    }
}

fn is_stream_url(value: &str) -> bool {
    value.starts_with("ws://") || value.starts_with("wss://")
}

impl PreviewConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        log::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Build the config for a launch target.
    ///
    /// `Pick` yields a config without a source.
    pub fn for_target(target: &LaunchTarget) -> Result<Self, ConfigError> {
        match target {
            LaunchTarget::Config(path) => Self::load(path),
            LaunchTarget::Stream(url) => Ok(Self {
                source: Some(SourceConfig::Stream {
                    url: url.clone(),
                    framing: FrameFraming::Headered,
                }),
                ..Default::default()
            }),
            LaunchTarget::File(path) => {
                let defaults = Self::default();
                Ok(Self {
                    source: Some(defaults.raw_file(path.clone())),
                    ..defaults
                })
            }
            LaunchTarget::Pick => Ok(Self::default()),
        }
    }

    /// Source for a raw file in the default raw format
    pub fn raw_file(&self, path: PathBuf) -> SourceConfig {
        SourceConfig::File {
            path,
            width: self.raw_format.width,
            height: self.raw_format.height,
            fps: self.raw_format.fps,
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides looked up through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let Some(url) = lookup(URL_ENV).filter(|url| !url.is_empty()) else {
            return;
        };

        log::info!("Stream URL overridden by {}: {}", URL_ENV, url);
        let framing = match &self.source {
            Some(SourceConfig::Stream { framing, .. }) => *framing,
            _ => FrameFraming::Headered,
        };
        self.source = Some(SourceConfig::Stream { url, framing });
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.source {
            Some(SourceConfig::Stream { url, framing }) => {
                if !is_stream_url(url) {
                    return Err(ConfigError::Invalid(format!("not a WebSocket URL: {}", url)));
                }
                if framing.known_size().is_some_and(|size| size.is_empty()) {
                    return Err(ConfigError::Invalid("raw framing needs non-zero dimensions".to_string()));
                }
            }
            Some(SourceConfig::File { width, height, fps, .. }) => {
                if *width == 0 || *height == 0 {
                    return Err(ConfigError::Invalid(format!("invalid frame size {}x{}", width, height)));
                }
                if frame_interval(*fps).is_none() {
                    return Err(ConfigError::Invalid(format!("invalid frame rate {}", fps)));
                }
            }
            None => {}
        }

        if self.raw_format.width == 0 || self.raw_format.height == 0 || frame_interval(self.raw_format.fps).is_none() {
            return Err(ConfigError::Invalid("invalid raw_format".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_config() {
        let json = r#"{
            "source": {"type": "stream", "url": "ws://127.0.0.1:9001", "framing": {"kind": "raw", "width": 256, "height": 256}},
            "backend": "software"
        }"#;
        let config: PreviewConfig = serde_json::from_str(json).unwrap();

        assert_eq!(
            config.source,
            Some(SourceConfig::Stream {
                url: "ws://127.0.0.1:9001".to_string(),
                framing: FrameFraming::Raw { width: 256, height: 256 },
            })
        );
        assert_eq!(config.backend, BackendKind::Software);
        assert_eq!(config.window, WindowConfig::default());
        assert!(config.autoplay);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_source_defaults_fps() {
        let json = r#"{"source": {"type": "file", "path": "clip.rgba", "width": 4, "height": 4}}"#;
        let config: PreviewConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.source, Some(SourceConfig::File { fps, .. }) if fps == 30.0));
    }

    #[test]
    fn test_validation() {
        let mut config = PreviewConfig {
            source: Some(SourceConfig::Stream {
                url: "http://example.com".to_string(),
                framing: FrameFraming::Headered,
            }),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.source = Some(SourceConfig::File {
            path: PathBuf::from("clip.rgba"),
            width: 0,
            height: 4,
            fps: 30.0,
        });
        assert!(config.validate().is_err());

        config.source = Some(SourceConfig::File {
            path: PathBuf::from("clip.rgba"),
            width: 4,
            height: 4,
            fps: 1e-30,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_keeps_framing() {
        let mut config = PreviewConfig {
            source: Some(SourceConfig::Stream {
                url: "ws://a:1".to_string(),
                framing: FrameFraming::Raw { width: 8, height: 8 },
            }),
            ..Default::default()
        };
        config.apply_overrides(|key| (key == URL_ENV).then(|| "ws://b:2".to_string()));

        assert_eq!(
            config.source,
            Some(SourceConfig::Stream {
                url: "ws://b:2".to_string(),
                framing: FrameFraming::Raw { width: 8, height: 8 },
            })
        );

        // Empty values are ignored
        config.apply_overrides(|_| Some(String::new()));
        assert!(matches!(&config.source, Some(SourceConfig::Stream { url, .. }) if url == "ws://b:2"));
    }

    #[test]
    fn test_launch_targets() {
        assert_eq!(LaunchTarget::from_arg(None), LaunchTarget::Pick);
        assert_eq!(
            LaunchTarget::from_arg(Some("wss://host/stream")),
            LaunchTarget::Stream("wss://host/stream".to_string())
        );
        assert_eq!(
            LaunchTarget::from_arg(Some("preview.json")),
            LaunchTarget::Config(PathBuf::from("preview.json"))
        );
        assert_eq!(
            LaunchTarget::from_arg(Some("clip.rgba")),
            LaunchTarget::File(PathBuf::from("clip.rgba"))
        );

        let config = PreviewConfig::for_target(&LaunchTarget::File(PathBuf::from("clip.rgba"))).unwrap();
        assert_eq!(
            config.source,
            Some(SourceConfig::File {
                path: PathBuf::from("clip.rgba"),
                width: 256,
                height: 256,
                fps: 30.0,
            })
        );
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("stream-preview-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"backend": "software", "autoplay": false}"#).unwrap();

        let config = PreviewConfig::load(&path).unwrap();
        assert_eq!(config.backend, BackendKind::Software);
        assert!(!config.autoplay);
        assert_eq!(config.source, None);

        std::fs::write(&path, r#"{"source": {"type": "stream", "url": "http://x"}}"#).unwrap();
        assert!(matches!(PreviewConfig::load(&path), Err(ConfigError::Invalid(_))));
        let _ = std::fs::remove_file(&path);
    }
}
