//! Media stream model and the capture-device seam.
//!
//! A [`MediaStream`] is an id plus tracks. Tracks are shared handles: clones
//! observe the same `enabled` flag and live/ended state, so stopping a track
//! anywhere is visible to every holder (including a remote peer's router in
//! tests).

use crate::errors::MediaError;
use async_trait::async_trait;
use common::types::StreamId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

#[derive(Debug)]
struct TrackInner {
    id: Uuid,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    state: watch::Sender<TrackState>,
}

/// One audio or video track.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    #[must_use]
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        let (state, _) = watch::channel(TrackState::Live);
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4(),
                kind,
                label: label.into(),
                enabled: AtomicBool::new(true),
                state,
            }),
        }
    }

    #[must_use]
    pub fn audio(label: impl Into<String>) -> Self {
        Self::new(TrackKind::Audio, label)
    }

    #[must_use]
    pub fn video(label: impl Into<String>) -> Self {
        Self::new(TrackKind::Video, label)
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    #[must_use]
    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether the track is producing media (false = mic muted).
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    #[must_use]
    pub fn state(&self) -> TrackState {
        *self.inner.state.borrow()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// End the track. Returns `true` if it was live.
    pub fn stop(&self) -> bool {
        self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = TrackState::Ended;
                true
            } else {
                false
            }
        })
    }

    /// Resolves once the track has ended, by [`MediaTrack::stop`] or by the
    /// platform (e.g. the user ending a share from the OS picker).
    pub async fn ended(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == TrackState::Ended).await;
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for MediaTrack {}

/// A set of tracks delivered or sent together.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: StreamId,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    #[must_use]
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: StreamId::new(),
            tracks,
        }
    }

    /// Video tracks of `video_from` plus audio tracks of `audio_from`, as a
    /// new stream. Tracks are shared, not copied.
    #[must_use]
    pub fn combine(video_from: &MediaStream, audio_from: &MediaStream) -> Self {
        let tracks = video_from
            .video_tracks()
            .chain(audio_from.audio_tracks())
            .cloned()
            .collect();
        Self::new(tracks)
    }

    #[must_use]
    pub fn id(&self) -> StreamId {
        self.id
    }

    #[must_use]
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == TrackKind::Video)
    }

    #[must_use]
    pub fn has_video(&self) -> bool {
        self.video_tracks().next().is_some()
    }

    #[must_use]
    pub fn has_audio(&self) -> bool {
        self.audio_tracks().next().is_some()
    }

    /// True while at least one track is live.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(MediaTrack::is_live)
    }

    /// Stop every track. Returns how many were still live.
    pub fn stop_all(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        for track in self.audio_tracks() {
            track.set_enabled(enabled);
        }
    }
}

/// Microphone capture constraints.
///
/// Echo cancellation and automatic gain control are always requested; only
/// noise suppression is user-controlled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
    pub noise_suppression: bool,
}

impl AudioConstraints {
    #[must_use]
    pub const fn voice(noise_suppression: bool) -> Self {
        Self {
            echo_cancellation: true,
            auto_gain_control: true,
            noise_suppression,
        }
    }

    #[must_use]
    pub const fn with_noise_suppression(self, noise_suppression: bool) -> Self {
        Self {
            noise_suppression,
            ..self
        }
    }
}

/// Capture device access, supplied by the host platform.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Request a microphone stream.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` or `DeviceUnavailable`.
    async fn get_user_media(&self, constraints: AudioConstraints)
        -> Result<MediaStream, MediaError>;

    /// Show the display picker and return the chosen surface.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the picker was dismissed.
    async fn get_display_media(&self) -> Result<MediaStream, MediaError>;
}
