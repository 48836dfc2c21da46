//! Client -> Server message parsing.

use crate::ProtocolError;
use serde::{Deserialize, Serialize};

/// Parsed client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Ask for a fresh, unfiltered snapshot on the next tick.
    Subscribe,
    /// Profiles of every agent currently in the world.
    RequestProfiles,
    /// A single profile.
    RequestProfile { agent_id: String },
    /// Camera center used for AOI filtering.
    Viewport { x: f64, z: f64 },
    /// Lock the camera onto an agent.
    Follow { agent_id: String },
    RequestRoomInfo,
}

impl ClientMessage {
    /// Parse a client message from a text frame.
    ///
    /// Frames longer than `max_len` bytes are rejected before any parsing.
    pub fn parse(data: &str, max_len: usize) -> Result<Self, ProtocolError> {
        if data.len() > max_len {
            return Err(ProtocolError::FrameTooLarge {
                len: data.len(),
                max: max_len,
            });
        }
        Ok(serde_json::from_str(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_FRAME_BYTES;

    #[test]
    fn test_parse_unit_messages() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"subscribe"}"#, MAX_FRAME_BYTES).unwrap(),
            ClientMessage::Subscribe
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"requestRoomInfo"}"#, MAX_FRAME_BYTES).unwrap(),
            ClientMessage::RequestRoomInfo
        );
    }

    #[test]
    fn test_parse_viewport_and_follow() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"viewport","x":12.5,"z":-3}"#, MAX_FRAME_BYTES)
                .unwrap(),
            ClientMessage::Viewport { x: 12.5, z: -3.0 }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"follow","agentId":"a7"}"#, MAX_FRAME_BYTES).unwrap(),
            ClientMessage::Follow {
                agent_id: "a7".into()
            }
        );
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            ClientMessage::parse("not json", MAX_FRAME_BYTES),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"viewport","x":1}"#, MAX_FRAME_BYTES),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"dance"}"#, MAX_FRAME_BYTES),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_oversized_frame() {
        let padding = " ".repeat(MAX_FRAME_BYTES);
        let frame = format!(r#"{{"type":"subscribe"}}{padding}"#);
        assert!(matches!(
            ClientMessage::parse(&frame, MAX_FRAME_BYTES),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }
}
