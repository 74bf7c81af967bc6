//! Client and server signaling events.

use crate::codec::ProtocolError;
use common::types::{ConnectionId, MeshId, RoomId};
use serde::{Deserialize, Serialize};

/// Maximum length of a room identifier, in characters.
pub const MAX_ROOM_ID_CHARS: usize = 64;

/// Maximum length of a mesh identifier, in characters.
pub const MAX_MESH_ID_CHARS: usize = 128;

/// Maximum length of a display name after trimming, in characters.
pub const MAX_DISPLAY_NAME_CHARS: usize = 64;

/// Numeric codes carried in [`ErrorPayload::code`].
pub mod error_codes {
    /// Frame could not be parsed or failed validation.
    pub const INVALID_REQUEST: i32 = 1;
    /// Relay-side failure; details are only logged.
    pub const INTERNAL_ERROR: i32 = 6;
    /// Frame exceeded the configured size limit.
    pub const PAYLOAD_TOO_LARGE: i32 = 8;
}

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Announce presence in a room once the mesh identity is ready.
    JoinVoice(JoinVoice),
    /// Report the local microphone mute state.
    ToggleMute(ToggleMute),
    /// Report the local deafen state.
    ToggleDeafen(ToggleDeafen),
    /// Leave voice without closing the signaling connection.
    LeaveVoice(LeaveVoice),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinVoice {
    pub room_id: RoomId,
    pub mesh_id: MeshId,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleMute {
    pub room_id: RoomId,
    pub is_muted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleDeafen {
    pub room_id: RoomId,
    pub is_deafened: bool,
}

/// Empty payload; serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveVoice {}

impl ClientEvent {
    /// Event name as it appears on the wire. Bounded set, safe as a metric label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinVoice(_) => "join-voice",
            ClientEvent::ToggleMute(_) => "toggle-mute",
            ClientEvent::ToggleDeafen(_) => "toggle-deafen",
            ClientEvent::LeaveVoice(_) => "leave-voice",
        }
    }

    /// Check field limits.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidField`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            ClientEvent::JoinVoice(join) => {
                check_field("roomId", join.room_id.as_str(), MAX_ROOM_ID_CHARS)?;
                check_field("meshId", join.mesh_id.as_str(), MAX_MESH_ID_CHARS)?;
                check_field("displayName", join.display_name.trim(), MAX_DISPLAY_NAME_CHARS)
            }
            ClientEvent::ToggleMute(ToggleMute { room_id, .. })
            | ClientEvent::ToggleDeafen(ToggleDeafen { room_id, .. }) => {
                check_field("roomId", room_id.as_str(), MAX_ROOM_ID_CHARS)
            }
            ClientEvent::LeaveVoice(_) => Ok(()),
        }
    }

    /// Trim surrounding whitespace from free-text fields.
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            ClientEvent::JoinVoice(mut join) => {
                join.display_name = join.display_name.trim().to_string();
                ClientEvent::JoinVoice(join)
            }
            other => other,
        }
    }
}

fn check_field(field: &'static str, value: &str, max_chars: usize) -> Result<(), ProtocolError> {
    if value.is_empty() {
        return Err(ProtocolError::InvalidField {
            field,
            reason: "must not be empty",
        });
    }
    if value.chars().count() > max_chars {
        return Err(ProtocolError::InvalidField {
            field,
            reason: "too long",
        });
    }
    if value.chars().any(char::is_control) {
        return Err(ProtocolError::InvalidField {
            field,
            reason: "contains control characters",
        });
    }
    Ok(())
}

/// Events the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Full presence snapshot, in relay join order.
    VoiceUsersUpdate(Vec<ParticipantInfo>),
    /// A participant entered the recipient's room.
    PeerJoined(MeshId),
    /// A participant left the recipient's room.
    PeerLeft(MeshId),
    /// A client frame was rejected.
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Event name as it appears on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ServerEvent::VoiceUsersUpdate(_) => "voice-users-update",
            ServerEvent::PeerJoined(_) => "peer-joined",
            ServerEvent::PeerLeft(_) => "peer-left",
            ServerEvent::Error(_) => "error",
        }
    }
}

/// One entry of a presence snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub mesh_id: MeshId,
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub room_id: RoomId,
    pub is_muted: bool,
    pub is_deafened: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: i32,
    pub message: String,
}
