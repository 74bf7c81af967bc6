//! Message, status and event types for the peer mesh actor.

use crate::errors::{ClientError, MediaError};
use crate::local_media::Capture;
use crate::transport::LinkId;
use common::types::{MeshId, RoomId, StreamId};
use signaling_protocol::ParticipantInfo;
use tokio::sync::oneshot;

/// Requests from [`super::PeerMeshHandle`] to the actor.
#[derive(Debug)]
pub enum MeshMessage {
    /// Enter a room. Replies once the session is active or has failed.
    JoinRoom {
        room_id: RoomId,
        respond_to: oneshot::Sender<Result<MeshId, ClientError>>,
    },

    LeaveRoom {
        respond_to: oneshot::Sender<Result<(), ClientError>>,
    },

    /// Replies with the new muted flag.
    ToggleMic {
        respond_to: oneshot::Sender<Result<bool, ClientError>>,
    },

    /// Replies with the new deafened flag.
    ToggleDeafen {
        respond_to: oneshot::Sender<Result<bool, ClientError>>,
    },

    /// Replies with the new noise suppression flag once the replacement
    /// stream is installed.
    ToggleNoiseSuppression {
        respond_to: oneshot::Sender<Result<bool, ClientError>>,
    },

    /// Replies with the new sharing flag once the replacement stream is
    /// installed.
    ToggleScreenShare {
        respond_to: oneshot::Sender<Result<bool, ClientError>>,
    },

    GetState {
        respond_to: oneshot::Sender<MeshStatus>,
    },

    /// Latest presence snapshot, filtered to one room.
    GetPresence {
        room_id: RoomId,
        respond_to: oneshot::Sender<Vec<ParticipantInfo>>,
    },
}

/// Lifecycle of the local voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshState {
    Idle,
    Joining,
    Active,
}

/// Snapshot of the actor's local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshStatus {
    pub state: MeshState,
    pub room_id: Option<RoomId>,
    pub mesh_id: Option<MeshId>,
    pub mic_muted: bool,
    pub deafened: bool,
    pub screen_sharing: bool,
    pub noise_suppression: bool,
    /// In voice without a local stream (after a failed replacement).
    pub voice_silent: bool,
    pub links: usize,
    pub screen_holder: Option<MeshId>,
    pub voice_sinks: usize,
}

/// Notifications for the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    StateChanged(MeshState),
    PeerJoined(MeshId),
    PeerLeft(MeshId),
    /// The full snapshot from the latest `voice-users-update`.
    PresenceUpdated(Vec<ParticipantInfo>),
    ScreenShareStarted {
        peer: MeshId,
        display_name: Option<String>,
    },
    ScreenShareEnded {
        peer: MeshId,
    },
    /// Our own share ended from outside the client (OS picker) and the
    /// microphone-only stream was restored.
    LocalShareEnded,
    /// A placed call produced no remote stream in time.
    CallSetupTimedOut {
        peer: MeshId,
    },
    /// The relay rejected one of our frames.
    RelayError {
        code: i32,
        message: String,
    },
}

/// Why a capture was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MediaPurpose {
    Join,
    NoiseSuppression,
    StartShare,
    StopShare,
}

/// Results posted back to the actor by tasks it spawned. `epoch` identifies
/// the session that spawned them.
#[derive(Debug)]
pub(crate) enum Internal {
    Captured {
        epoch: u64,
        purpose: MediaPurpose,
        result: Result<Capture, MediaError>,
    },
    CallSetupCheck {
        epoch: u64,
        peer: MeshId,
        link: LinkId,
    },
    ShareEnded {
        epoch: u64,
        stream_id: StreamId,
    },
}
