//! Playback surface that records calls and keeps the resulting view.

use common::types::{MeshId, StreamId};
use std::collections::HashMap;
use std::sync::Mutex;
use voice_client::media::MediaStream;
use voice_client::router::PlaybackSurface;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    AttachVoice { peer: MeshId, stream_id: StreamId, muted: bool },
    DetachVoice { peer: MeshId },
    ShowScreen { peer: MeshId, stream_id: StreamId },
    ClearScreen { peer: MeshId },
    VoiceMuted { peer: MeshId, muted: bool },
    ScreenMuted { muted: bool },
}

#[derive(Default)]
struct View {
    voice: HashMap<MeshId, (StreamId, bool)>,
    screen: Option<(MeshId, StreamId)>,
    screen_muted: bool,
}

#[derive(Default)]
pub struct RecordingSurface {
    calls: Mutex<Vec<SurfaceCall>>,
    view: Mutex<View>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<SurfaceCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    /// Stream currently playing for `peer`.
    pub fn voice_stream(&self, peer: &MeshId) -> Option<StreamId> {
        self.view.lock().unwrap().voice.get(peer).map(|(id, _)| *id)
    }

    pub fn voice_muted(&self, peer: &MeshId) -> Option<bool> {
        self.view.lock().unwrap().voice.get(peer).map(|(_, muted)| *muted)
    }

    pub fn voice_count(&self) -> usize {
        self.view.lock().unwrap().voice.len()
    }

    /// Holder and stream of the displayed screen.
    pub fn screen(&self) -> Option<(MeshId, StreamId)> {
        self.view.lock().unwrap().screen.clone()
    }

    pub fn screen_muted(&self) -> bool {
        self.view.lock().unwrap().screen_muted
    }

    fn record(&self, call: SurfaceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PlaybackSurface for RecordingSurface {
    fn attach_voice(&self, peer: &MeshId, stream: &MediaStream, muted: bool) {
        self.view
            .lock()
            .unwrap()
            .voice
            .insert(peer.clone(), (stream.id(), muted));
        self.record(SurfaceCall::AttachVoice {
            peer: peer.clone(),
            stream_id: stream.id(),
            muted,
        });
    }

    fn detach_voice(&self, peer: &MeshId) {
        self.view.lock().unwrap().voice.remove(peer);
        self.record(SurfaceCall::DetachVoice { peer: peer.clone() });
    }

    fn show_screen(&self, peer: &MeshId, stream: &MediaStream, muted: bool) {
        {
            let mut view = self.view.lock().unwrap();
            view.screen = Some((peer.clone(), stream.id()));
            view.screen_muted = muted;
        }
        self.record(SurfaceCall::ShowScreen {
            peer: peer.clone(),
            stream_id: stream.id(),
        });
    }

    fn clear_screen(&self, peer: &MeshId) {
        {
            let mut view = self.view.lock().unwrap();
            if view.screen.as_ref().is_some_and(|(holder, _)| holder == peer) {
                view.screen = None;
            }
        }
        self.record(SurfaceCall::ClearScreen { peer: peer.clone() });
    }

    fn set_voice_muted(&self, peer: &MeshId, muted: bool) {
        if let Some(entry) = self.view.lock().unwrap().voice.get_mut(peer) {
            entry.1 = muted;
        }
        self.record(SurfaceCall::VoiceMuted {
            peer: peer.clone(),
            muted,
        });
    }

    fn set_screen_muted(&self, muted: bool) {
        self.view.lock().unwrap().screen_muted = muted;
        self.record(SurfaceCall::ScreenMuted { muted });
    }
}
