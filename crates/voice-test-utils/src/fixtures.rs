//! Participants, snapshots and streams used across tests.

use common::types::{ConnectionId, MeshId, RoomId};
use signaling_protocol::{ClientEvent, JoinVoice, LeaveVoice, ParticipantInfo, ToggleDeafen, ToggleMute};
use voice_client::config::{LinkPolicy, MeshSettings};
use voice_client::media::{MediaStream, MediaTrack};

pub const VOICE_LOUNGE: &str = "voice-lounge";
pub const GAMING: &str = "gaming";

pub fn voice_lounge() -> RoomId {
    RoomId::from(VOICE_LOUNGE)
}

pub fn gaming() -> RoomId {
    RoomId::from(GAMING)
}

/// A snapshot entry with both flags false.
pub fn participant(mesh_id: &str, room: &str, display_name: &str) -> ParticipantInfo {
    ParticipantInfo {
        mesh_id: MeshId::from(mesh_id),
        connection_id: ConnectionId::from(format!("conn-{mesh_id}")),
        display_name: display_name.to_string(),
        room_id: RoomId::from(room),
        is_muted: false,
        is_deafened: false,
    }
}

/// `(mesh_id, display_name)` pairs in `room`, in join order.
pub fn snapshot(room: &str, members: &[(&str, &str)]) -> Vec<ParticipantInfo> {
    members
        .iter()
        .map(|(mesh_id, name)| participant(mesh_id, room, name))
        .collect()
}

pub fn join_voice(room: &str, mesh_id: &str, display_name: &str) -> ClientEvent {
    ClientEvent::JoinVoice(JoinVoice {
        room_id: RoomId::from(room),
        mesh_id: MeshId::from(mesh_id),
        display_name: display_name.to_string(),
    })
}

pub fn toggle_mute(room: &str, is_muted: bool) -> ClientEvent {
    ClientEvent::ToggleMute(ToggleMute {
        room_id: RoomId::from(room),
        is_muted,
    })
}

pub fn toggle_deafen(room: &str, is_deafened: bool) -> ClientEvent {
    ClientEvent::ToggleDeafen(ToggleDeafen {
        room_id: RoomId::from(room),
        is_deafened,
    })
}

pub fn leave_voice() -> ClientEvent {
    ClientEvent::LeaveVoice(LeaveVoice {})
}

/// Microphone-only stream.
pub fn voice_stream() -> MediaStream {
    MediaStream::new(vec![MediaTrack::audio("remote microphone")])
}

/// Display video plus microphone.
pub fn screen_stream() -> MediaStream {
    MediaStream::new(vec![
        MediaTrack::video("remote display"),
        MediaTrack::audio("remote microphone"),
    ])
}

/// Settings with the watchdog off, so tests never see stray timeouts.
pub fn settings(display_name: &str) -> MeshSettings {
    MeshSettings {
        call_setup_timeout: None,
        ..MeshSettings::new(display_name)
    }
}

pub fn settings_with_policy(display_name: &str, link_policy: LinkPolicy) -> MeshSettings {
    MeshSettings {
        link_policy,
        ..settings(display_name)
    }
}
