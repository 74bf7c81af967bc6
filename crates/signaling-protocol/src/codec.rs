//! Codec for signaling text frames.

use crate::events::{ClientEvent, ServerEvent};

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame exceeded the size limit
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame is not valid JSON or does not match any event
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// Event parsed but a field failed validation
    #[error("Invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    /// Encoding failed
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Encode a server event into a text frame
///
/// # Errors
///
/// Returns an error if serialization fails
pub fn encode_server_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Encode a client event into a text frame
///
/// # Errors
///
/// Returns an error if serialization fails
pub fn encode_client_event(event: &ClientEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decode, validate and normalize a client text frame.
///
/// The size check runs before parsing so oversized frames are never
/// deserialized.
///
/// # Errors
///
/// Returns an error if the frame is too large, malformed, or fails validation
pub fn decode_client_event(frame: &str, max_bytes: usize) -> Result<ClientEvent, ProtocolError> {
    if frame.len() > max_bytes {
        return Err(ProtocolError::FrameTooLarge {
            size: frame.len(),
            max: max_bytes,
        });
    }

    let event: ClientEvent =
        serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    event.validate()?;
    Ok(event.normalized())
}

/// Decode a server text frame
///
/// # Errors
///
/// Returns an error if the frame does not match any server event
pub fn decode_server_event(frame: &str) -> Result<ServerEvent, ProtocolError> {
    serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::events::{ErrorPayload, JoinVoice};
    use common::types::MeshId;

    const LIMIT: usize = 16 * 1024;

    #[test]
    fn test_decode_client_event_normalizes_join() {
        let frame = r#"{"event":"join-voice","data":{"roomId":"voice-lounge","meshId":"p1","displayName":" X "}}"#;
        let event = decode_client_event(frame, LIMIT).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinVoice(JoinVoice {
                room_id: "voice-lounge".into(),
                mesh_id: "p1".into(),
                display_name: "X".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_rejects_oversized_frame_before_parsing() {
        let frame = "x".repeat(64);
        let result = decode_client_event(&frame, 32);
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { size: 64, max: 32 })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_event() {
        let frame = r#"{"event":"send-message","data":{"text":"hi"}}"#;
        assert!(matches!(
            decode_client_event(frame, LIMIT),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let frame = r#"{"event":"toggle-mute","data":{"roomId":"r"}}"#;
        assert!(matches!(
            decode_client_event(frame, LIMIT),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_surfaces_validation_errors() {
        let frame = r#"{"event":"join-voice","data":{"roomId":"r","meshId":"","displayName":"X"}}"#;
        assert!(matches!(
            decode_client_event(frame, LIMIT),
            Err(ProtocolError::InvalidField { field: "meshId", .. })
        ));
    }

    #[test]
    fn test_server_event_encode_decode() {
        let event = ServerEvent::Error(ErrorPayload {
            code: 1,
            message: "Invalid request".to_string(),
        });
        let frame = encode_server_event(&event).unwrap();
        assert_eq!(decode_server_event(&frame).unwrap(), event);

        let left = decode_server_event(r#"{"event":"peer-left","data":"p9"}"#).unwrap();
        assert_eq!(left, ServerEvent::PeerLeft(MeshId::from("p9")));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            ProtocolError::InvalidField {
                field: "roomId",
                reason: "too long"
            }
            .to_string(),
            "Invalid field roomId: too long"
        );
    }
}
