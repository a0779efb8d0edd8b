//! Wire format of the frame stream
//!
//! Binary messages carry pixels, either raw (dimensions agreed out of band) or
//! prefixed by an 8-byte little-endian `width, height` header. Text messages
//! carry JSON control messages in both directions.

use crate::transfer::{FrameSize, Transferable};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How binary messages on the stream are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameFraming {
    /// Bare RGBA8 pixels of a known size
    Raw { width: u32, height: u32 },
    /// Every message starts with a [`StreamHeader`]
    #[default]
    Headered,
}

impl FrameFraming {
    /// Frame size known before the first message, if any
    pub fn known_size(&self) -> Option<FrameSize> {
        match *self {
            FrameFraming::Raw { width, height } => Some(FrameSize::new(width, height)),
            FrameFraming::Headered => None,
        }
    }
}

/// Malformed binary messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message of {0} bytes is shorter than the frame header")]
    Truncated(usize),
    #[error("header announces an empty frame ({0})")]
    EmptyFrame(FrameSize),
    #[error("header announces a frame too large to address ({0})")]
    TooLarge(FrameSize),
    #[error("payload of {actual} bytes does not match {size} ({expected} bytes)")]
    PayloadLength {
        size: FrameSize,
        expected: usize,
        actual: usize,
    },
}

/// Leading dimensions of a headered frame message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub width: u32,
    pub height: u32,
}

impl StreamHeader {
    pub const LEN: usize = 8;

    pub fn new(size: FrameSize) -> Self {
        Self {
            width: size.width,
            height: size.height,
        }
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let header: &[u8; Self::LEN] = bytes
            .get(..Self::LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or(ProtocolError::Truncated(bytes.len()))?;

        let [w0, w1, w2, w3, h0, h1, h2, h3] = *header;
        Ok(Self {
            width: u32::from_le_bytes([w0, w1, w2, w3]),
            height: u32::from_le_bytes([h0, h1, h2, h3]),
        })
    }

    /// Build a complete message: header followed by `payload`
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut message = Vec::with_capacity(Self::LEN + payload.len());
        message.extend_from_slice(&self.width.to_le_bytes());
        message.extend_from_slice(&self.height.to_le_bytes());
        message.extend_from_slice(payload);
        message
    }
}

/// Turn one binary message into a transferable frame.
///
/// Raw messages are passed through untouched; their length is checked by the
/// render worker against the size it was initialised with. Headered messages
/// are validated here and tagged with the announced size.
pub fn decode_frame(framing: FrameFraming, message: Bytes) -> Result<Transferable, ProtocolError> {
    match framing {
        FrameFraming::Raw { .. } => Ok(Transferable::new(message)),
        FrameFraming::Headered => {
            let header = StreamHeader::parse(&message)?;
            let size = header.size();
            if size.is_empty() {
                return Err(ProtocolError::EmptyFrame(size));
            }
            let expected = size.checked_byte_len().ok_or(ProtocolError::TooLarge(size))?;

            let mut payload = message;
            drop(payload.split_to(StreamHeader::LEN));

            if payload.len() != expected {
                return Err(ProtocolError::PayloadLength {
                    size,
                    expected,
                    actual: payload.len(),
                });
            }

            Ok(Transferable::new(payload).with_announced_size(size))
        }
    }
}

/// Control messages sent by the preview to the frame server
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Jump to a normalised position in `[0, 1]`
    Seek { position: f64 },
    Play,
    Pause,
}

/// Messages sent by the frame server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Current normalised position
    Position { position: f64 },
    /// Request could not be handled
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout_is_little_endian() {
        let message = StreamHeader::new(FrameSize::new(256, 2)).encode(&[0xaa]);
        assert_eq!(&message[..8], &[0, 1, 0, 0, 2, 0, 0, 0]);
        assert_eq!(message[8], 0xaa);
    }

    #[test]
    fn test_headered_frame_is_tagged() {
        let size = FrameSize::new(2, 2);
        let payload: Vec<u8> = (0..16).collect();
        let message = StreamHeader::new(size).encode(&payload);

        let mut frame = decode_frame(FrameFraming::Headered, Bytes::from(message)).unwrap();
        assert_eq!(frame.bytes().unwrap(), payload.as_slice());

        let (buffer, _) = frame.detach().unwrap();
        assert_eq!(buffer.announced_size(), Some(size));
        assert!(buffer.fits(size));
    }

    #[test]
    fn test_malformed_headered_messages() {
        let truncated = decode_frame(FrameFraming::Headered, Bytes::from_static(&[1, 0, 0]));
        assert_eq!(truncated.unwrap_err(), ProtocolError::Truncated(3));

        let empty = StreamHeader::new(FrameSize::new(0, 4)).encode(&[]);
        assert!(matches!(
            decode_frame(FrameFraming::Headered, Bytes::from(empty)).unwrap_err(),
            ProtocolError::EmptyFrame(_)
        ));

        let short = StreamHeader::new(FrameSize::new(2, 2)).encode(&[0; 12]);
        assert_eq!(
            decode_frame(FrameFraming::Headered, Bytes::from(short)).unwrap_err(),
            ProtocolError::PayloadLength {
                size: FrameSize::new(2, 2),
                expected: 16,
                actual: 12,
            }
        );
    }

    #[test]
    fn test_max_dimension_header_is_rejected() {
        let size = FrameSize::new(u32::MAX, u32::MAX);
        let message = StreamHeader::new(size).encode(&[0; 16]);
        assert_eq!(
            decode_frame(FrameFraming::Headered, Bytes::from(message)).unwrap_err(),
            ProtocolError::TooLarge(size)
        );
    }

    #[test]
    fn test_raw_frames_pass_through() {
        let frame = decode_frame(FrameFraming::Raw { width: 1, height: 1 }, Bytes::from(vec![0u8; 3])).unwrap();
        assert_eq!(frame.bytes().unwrap().len(), 3);
    }

    #[test]
    fn test_control_messages_json() {
        let seek = serde_json::to_string(&ClientMessage::Seek { position: 0.5 }).unwrap();
        assert_eq!(seek, r#"{"type":"seek","position":0.5}"#);

        let play: ClientMessage = serde_json::from_str(r#"{"type":"play"}"#).unwrap();
        assert_eq!(play, ClientMessage::Play);

        let position: ServerMessage = serde_json::from_str(r#"{"type":"position","position":0.25}"#).unwrap();
        assert_eq!(position, ServerMessage::Position { position: 0.25 });
    }

    #[test]
    fn test_framing_config_json() {
        let framing: FrameFraming = serde_json::from_str(r#"{"kind":"raw","width":640,"height":360}"#).unwrap();
        assert_eq!(framing.known_size(), Some(FrameSize::new(640, 360)));

        let headered: FrameFraming = serde_json::from_str(r#"{"kind":"headered"}"#).unwrap();
        assert_eq!(headered.known_size(), None);
    }
}
