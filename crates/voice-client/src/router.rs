//! `RemoteStreamRouter` - classifies inbound streams and drives playback.
//!
//! Each sender has at most one voice sink; a new stream from the same sender
//! replaces it. At most one sender holds the screen claim, and switching
//! holders clears the previous screen first.

use crate::media::MediaStream;
use common::types::{MeshId, StreamId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Playback sinks, implemented by the host UI.
///
/// Calls are keyed by sender; `attach_voice` for a sender that already has a
/// sink replaces it.
pub trait PlaybackSurface: Send + Sync {
    fn attach_voice(&self, peer: &MeshId, stream: &MediaStream, muted: bool);
    fn detach_voice(&self, peer: &MeshId);
    fn show_screen(&self, peer: &MeshId, stream: &MediaStream, muted: bool);
    fn clear_screen(&self, peer: &MeshId);
    fn set_voice_muted(&self, peer: &MeshId, muted: bool);
    fn set_screen_muted(&self, muted: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Voice,
    Screen,
}

/// The remote participant currently showing a screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenClaim {
    pub holder: MeshId,
    pub stream_id: StreamId,
}

pub struct RemoteStreamRouter {
    surface: Arc<dyn PlaybackSurface>,
    voice_sinks: HashMap<MeshId, StreamId>,
    screen_claim: Option<ScreenClaim>,
    deafened: bool,
}

impl RemoteStreamRouter {
    pub fn new(surface: Arc<dyn PlaybackSurface>) -> Self {
        Self {
            surface,
            voice_sinks: HashMap::new(),
            screen_claim: None,
            deafened: false,
        }
    }

    /// Any video track makes a stream a screen share.
    #[must_use]
    pub fn classify(stream: &MediaStream) -> StreamKind {
        if stream.has_video() {
            StreamKind::Screen
        } else {
            StreamKind::Voice
        }
    }

    /// Route an inbound stream from `from`.
    pub fn route(&mut self, from: &MeshId, stream: &MediaStream) -> StreamKind {
        let kind = Self::classify(stream);
        match kind {
            StreamKind::Voice => {
                self.attach_voice(from, stream);
                if self.holds_claim(from) {
                    self.clear_claim();
                }
            }
            StreamKind::Screen => {
                if self.screen_claim.as_ref().is_some_and(|c| &c.holder != from) {
                    self.clear_claim();
                }
                // The share carries the sharer's mic; keep them audible.
                self.attach_voice(from, stream);
                self.surface.show_screen(from, stream, self.deafened);
                self.screen_claim = Some(ScreenClaim {
                    holder: from.clone(),
                    stream_id: stream.id(),
                });
                info!(target: "client.router", peer = %from, stream_id = %stream.id(), "Screen claim installed");
            }
        }
        kind
    }

    /// Drop everything routed for a departed peer.
    pub fn peer_left(&mut self, peer: &MeshId) {
        if self.voice_sinks.remove(peer).is_some() {
            self.surface.detach_voice(peer);
            debug!(target: "client.router", peer = %peer, "Voice sink removed");
        }
        if self.holds_claim(peer) {
            self.clear_claim();
        }
    }

    /// Remove every sink (local leave).
    pub fn clear_all(&mut self) {
        self.clear_claim();
        for (peer, _) in self.voice_sinks.drain() {
            self.surface.detach_voice(&peer);
        }
    }

    /// Re-apply muting to every voice sink and the screen.
    pub fn set_deafened(&mut self, deafened: bool) {
        self.deafened = deafened;
        for peer in self.voice_sinks.keys() {
            self.surface.set_voice_muted(peer, deafened);
        }
        self.surface.set_screen_muted(deafened);
    }

    #[must_use]
    pub fn is_deafened(&self) -> bool {
        self.deafened
    }

    #[must_use]
    pub fn screen_claim(&self) -> Option<&ScreenClaim> {
        self.screen_claim.as_ref()
    }

    #[must_use]
    pub fn screen_holder(&self) -> Option<&MeshId> {
        self.screen_claim.as_ref().map(|c| &c.holder)
    }

    /// Stream currently playing in `peer`'s voice sink.
    #[must_use]
    pub fn voice_stream(&self, peer: &MeshId) -> Option<StreamId> {
        self.voice_sinks.get(peer).copied()
    }

    #[must_use]
    pub fn voice_sink_count(&self) -> usize {
        self.voice_sinks.len()
    }

    fn attach_voice(&mut self, from: &MeshId, stream: &MediaStream) {
        let replaced = self.voice_sinks.insert(from.clone(), stream.id());
        self.surface.attach_voice(from, stream, self.deafened);
        debug!(
            target: "client.router",
            peer = %from,
            stream_id = %stream.id(),
            replaced = replaced.is_some(),
            "Voice sink attached"
        );
    }

    fn holds_claim(&self, peer: &MeshId) -> bool {
        self.screen_claim.as_ref().is_some_and(|c| &c.holder == peer)
    }

    fn clear_claim(&mut self) {
        if let Some(claim) = self.screen_claim.take() {
            self.surface.clear_screen(&claim.holder);
            info!(target: "client.router", peer = %claim.holder, "Screen claim cleared");
        }
    }
}
