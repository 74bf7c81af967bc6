//! Scripted capture devices.
//!
//! Every stream handed out is remembered, so tests can assert which tracks
//! are still live after replacements and leaves.
//!
//! # Example
//!
//! ```rust,ignore
//! let devices = Arc::new(FakeMediaDevices::new());
//! devices.fail_next_mic(MediaError::PermissionDenied("blocked".into()));
//! let gate = devices.hold_mic(); // get_user_media now waits for gate.release()
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use voice_client::errors::MediaError;
use voice_client::media::{AudioConstraints, MediaDevices, MediaStream, MediaTrack};

#[derive(Default)]
struct DeviceState {
    mic_failures: VecDeque<MediaError>,
    display_failures: VecDeque<MediaError>,
    mic_requests: Vec<AudioConstraints>,
    display_requests: usize,
    mic_streams: Vec<MediaStream>,
    display_streams: Vec<MediaStream>,
}

/// Holds microphone requests until released.
#[derive(Clone)]
pub struct MediaGate {
    semaphore: Arc<Semaphore>,
}

impl MediaGate {
    /// Let every held and future request through.
    pub fn release(&self) {
        self.semaphore.close();
    }
}

#[derive(Default)]
pub struct FakeMediaDevices {
    state: Mutex<DeviceState>,
    gate: Mutex<Option<MediaGate>>,
}

impl FakeMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next microphone request fails with `err`.
    pub fn fail_next_mic(&self, err: MediaError) {
        self.state.lock().unwrap().mic_failures.push_back(err);
    }

    /// The next display request fails with `err` (`Cancelled` = picker dismissed).
    pub fn fail_next_display(&self, err: MediaError) {
        self.state.lock().unwrap().display_failures.push_back(err);
    }

    /// Block microphone requests until the returned gate is released.
    pub fn hold_mic(&self) -> MediaGate {
        let gate = MediaGate {
            semaphore: Arc::new(Semaphore::new(0)),
        };
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn mic_requests(&self) -> Vec<AudioConstraints> {
        self.state.lock().unwrap().mic_requests.clone()
    }

    pub fn display_requests(&self) -> usize {
        self.state.lock().unwrap().display_requests
    }

    pub fn mic_streams(&self) -> Vec<MediaStream> {
        self.state.lock().unwrap().mic_streams.clone()
    }

    /// Live microphone tracks across every stream ever handed out.
    pub fn live_mic_tracks(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .mic_streams
            .iter()
            .flat_map(|s| s.audio_tracks())
            .filter(|t| t.is_live())
            .count()
    }

    /// Live display video tracks.
    pub fn live_display_tracks(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .display_streams
            .iter()
            .flat_map(|s| s.video_tracks())
            .filter(|t| t.is_live())
            .count()
    }

    /// Simulate the user ending the share from the OS picker.
    pub fn end_display(&self) {
        let state = self.state.lock().unwrap();
        let stream = state
            .display_streams
            .last()
            .expect("no display stream has been handed out");
        for track in stream.video_tracks() {
            track.stop();
        }
    }
}

#[async_trait]
impl MediaDevices for FakeMediaDevices {
    async fn get_user_media(
        &self,
        constraints: AudioConstraints,
    ) -> Result<MediaStream, MediaError> {
        self.state.lock().unwrap().mic_requests.push(constraints);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            // Closed semaphore = released.
            let _ = gate.semaphore.acquire().await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.mic_failures.pop_front() {
            return Err(err);
        }
        let stream = MediaStream::new(vec![MediaTrack::audio("fake microphone")]);
        state.mic_streams.push(stream.clone());
        Ok(stream)
    }

    async fn get_display_media(&self) -> Result<MediaStream, MediaError> {
        let mut state = self.state.lock().unwrap();
        state.display_requests += 1;
        if let Some(err) = state.display_failures.pop_front() {
            return Err(err);
        }
        let stream = MediaStream::new(vec![
            MediaTrack::video("fake display"),
            MediaTrack::audio("fake display audio"),
        ]);
        state.display_streams.push(stream.clone());
        Ok(stream)
    }
}
