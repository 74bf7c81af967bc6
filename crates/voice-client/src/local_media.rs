//! `LocalMediaController` - owner of the single local capture session.
//!
//! Capture is split into a [`CaptureRequest`] (built from current state,
//! executed anywhere, including a spawned task) and
//! [`LocalMediaController::install`] / [`LocalMediaController::fail`], which
//! commit the result. The peer mesh actor uses the split form so a slow
//! permission prompt never blocks its mailbox; the `acquire` / `replace` /
//! share helpers run both halves inline.
//!
//! Ordering rules:
//!
//! - A replacement stops every track of the current stream before the new
//!   microphone request, so at most one capture session is live.
//! - A screen share asks for the display first. A cancelled picker leaves
//!   the current stream untouched.
//! - A failed replacement does not resurrect the stopped stream; the session
//!   is voice-silent until the next successful capture.

use crate::errors::{ClientError, MediaError};
use crate::media::{AudioConstraints, MediaDevices, MediaStream};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a capture produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    /// Microphone audio only.
    Microphone,
    /// Display video combined with a fresh microphone track.
    Screen,
}

/// A capture to run against [`MediaDevices`].
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    kind: CaptureKind,
    constraints: AudioConstraints,
    retiring: Option<MediaStream>,
}

/// Result of a successful [`CaptureRequest`].
#[derive(Debug, Clone)]
pub struct Capture {
    pub stream: MediaStream,
    pub kind: CaptureKind,
    pub constraints: AudioConstraints,
}

impl CaptureRequest {
    #[must_use]
    pub fn kind(&self) -> CaptureKind {
        self.kind
    }

    #[must_use]
    pub fn constraints(&self) -> AudioConstraints {
        self.constraints
    }

    /// Run the capture.
    ///
    /// # Errors
    ///
    /// Any [`MediaError`] from the devices. If the microphone fails after a
    /// display grant, the display tracks are stopped before returning.
    pub async fn execute(self, devices: &dyn MediaDevices) -> Result<Capture, MediaError> {
        let display = match self.kind {
            CaptureKind::Screen => Some(devices.get_display_media().await?),
            CaptureKind::Microphone => None,
        };

        if let Some(old) = &self.retiring {
            let stopped = old.stop_all();
            debug!(target: "client.media", stream_id = %old.id(), stopped, "Retired local stream");
        }

        let mic = match devices.get_user_media(self.constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                if let Some(display) = &display {
                    display.stop_all();
                }
                return Err(e);
            }
        };

        let stream = match display {
            Some(display) => {
                // Only the display video is sent; the picker's own audio is unused.
                for track in display.audio_tracks() {
                    track.stop();
                }
                MediaStream::combine(&display, &mic)
            }
            None => mic,
        };

        Ok(Capture {
            stream,
            kind: self.kind,
            constraints: self.constraints,
        })
    }
}

/// Owns the local stream and the policy it was captured under.
pub struct LocalMediaController {
    devices: Arc<dyn MediaDevices>,
    stream: Option<MediaStream>,
    constraints: AudioConstraints,
    mic_enabled: bool,
    screen_sharing: bool,
}

impl LocalMediaController {
    pub fn new(devices: Arc<dyn MediaDevices>, noise_suppression: bool) -> Self {
        Self {
            devices,
            stream: None,
            constraints: AudioConstraints::voice(noise_suppression),
            mic_enabled: true,
            screen_sharing: false,
        }
    }

    #[must_use]
    pub fn devices(&self) -> Arc<dyn MediaDevices> {
        Arc::clone(&self.devices)
    }

    /// Constraints of the last successful capture (the effective policy).
    #[must_use]
    pub fn constraints(&self) -> AudioConstraints {
        self.constraints
    }

    #[must_use]
    pub fn current_stream(&self) -> Option<&MediaStream> {
        self.stream.as_ref()
    }

    #[must_use]
    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    #[must_use]
    pub fn is_screen_sharing(&self) -> bool {
        self.screen_sharing
    }

    #[must_use]
    pub fn mic_enabled(&self) -> bool {
        self.mic_enabled
    }

    /// A fresh capture that leaves the current stream alone until installed.
    #[must_use]
    pub fn acquire_request(&self, constraints: AudioConstraints) -> CaptureRequest {
        CaptureRequest {
            kind: CaptureKind::Microphone,
            constraints,
            retiring: None,
        }
    }

    /// A microphone capture that first stops the current stream.
    #[must_use]
    pub fn replace_request(&self, constraints: AudioConstraints) -> CaptureRequest {
        CaptureRequest {
            kind: CaptureKind::Microphone,
            constraints,
            retiring: self.stream.clone(),
        }
    }

    /// Replacement under the opposite noise suppression setting.
    ///
    /// # Errors
    ///
    /// `InvalidState` while a screen share is active.
    pub fn noise_suppression_request(&self) -> Result<CaptureRequest, ClientError> {
        if self.screen_sharing {
            return Err(ClientError::InvalidState(
                "noise suppression cannot change while sharing".to_string(),
            ));
        }
        let toggled = self
            .constraints
            .with_noise_suppression(!self.constraints.noise_suppression);
        Ok(self.replace_request(toggled))
    }

    /// # Errors
    ///
    /// `InvalidState` if a share is already active.
    pub fn start_share_request(&self) -> Result<CaptureRequest, ClientError> {
        if self.screen_sharing {
            return Err(ClientError::InvalidState("already sharing".to_string()));
        }
        Ok(CaptureRequest {
            kind: CaptureKind::Screen,
            constraints: self.constraints,
            retiring: self.stream.clone(),
        })
    }

    /// # Errors
    ///
    /// `InvalidState` if no share is active.
    pub fn stop_share_request(&self) -> Result<CaptureRequest, ClientError> {
        if !self.screen_sharing {
            return Err(ClientError::InvalidState("not sharing".to_string()));
        }
        Ok(self.replace_request(self.constraints))
    }

    /// Make a capture the current stream.
    ///
    /// Stops whatever was current, carries the mic enabled flag over, and
    /// adopts the capture's constraints. Returns the installed stream.
    pub fn install(&mut self, capture: Capture) -> MediaStream {
        if let Some(old) = self.stream.take() {
            if old.id() != capture.stream.id() {
                old.stop_all();
            }
        }

        capture.stream.set_audio_enabled(self.mic_enabled);
        self.constraints = capture.constraints;
        self.screen_sharing = capture.kind == CaptureKind::Screen;

        info!(
            target: "client.media",
            stream_id = %capture.stream.id(),
            screen = self.screen_sharing,
            noise_suppression = self.constraints.noise_suppression,
            "Local stream installed"
        );

        self.stream = Some(capture.stream.clone());
        capture.stream
    }

    /// Record a failed capture. Constraints keep their previous value; a
    /// stream stopped by the request is dropped, leaving the session silent.
    pub fn fail(&mut self, err: &MediaError) {
        let retired = self.stream.as_ref().is_some_and(|s| !s.is_live());
        if retired {
            self.stream = None;
            self.screen_sharing = false;
            warn!(target: "client.media", error = %err, "Capture failed, session is voice-silent");
        } else {
            debug!(target: "client.media", error = %err, "Capture failed, current stream kept");
        }
    }

    /// Mute or unmute the microphone. The flag survives replacements.
    /// Returns `false` when there is no audio track to apply it to.
    pub fn set_mic_enabled(&mut self, enabled: bool) -> bool {
        self.mic_enabled = enabled;
        match &self.stream {
            Some(stream) if stream.has_audio() => {
                stream.set_audio_enabled(enabled);
                true
            }
            _ => false,
        }
    }

    /// Restore per-session defaults (mic live, not sharing).
    pub fn reset_controls(&mut self) {
        self.mic_enabled = true;
        if let Some(stream) = &self.stream {
            stream.set_audio_enabled(true);
        }
    }

    /// Stop and drop the current stream.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let stopped = stream.stop_all();
            debug!(target: "client.media", stream_id = %stream.id(), stopped, "Local stream stopped");
        }
        self.screen_sharing = false;
    }

    /// Request a new microphone stream and install it.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` / `DeviceUnavailable`; the existing session (if any)
    /// is unaffected.
    pub async fn acquire(&mut self, constraints: AudioConstraints) -> Result<MediaStream, ClientError> {
        let request = self.acquire_request(constraints);
        let devices = self.devices();
        let capture = request.execute(devices.as_ref()).await?;
        Ok(self.install(capture))
    }

    /// Stop the current stream, then capture under `constraints`.
    ///
    /// # Errors
    ///
    /// `ReplaceFailed`; the session is voice-silent afterwards.
    pub async fn replace(&mut self, constraints: AudioConstraints) -> Result<MediaStream, ClientError> {
        let request = self.replace_request(constraints);
        self.run(request).await
    }

    /// # Errors
    ///
    /// `ShareCancelled` if the picker was dismissed, `ReplaceFailed` if the
    /// microphone could not be reacquired.
    pub async fn start_screen_share(&mut self) -> Result<MediaStream, ClientError> {
        let request = self.start_share_request()?;
        self.run(request).await
    }

    /// # Errors
    ///
    /// `ReplaceFailed` if the microphone could not be reacquired.
    pub async fn stop_screen_share(&mut self) -> Result<MediaStream, ClientError> {
        let request = self.stop_share_request()?;
        self.run(request).await
    }

    async fn run(&mut self, request: CaptureRequest) -> Result<MediaStream, ClientError> {
        let devices = self.devices();
        match request.execute(devices.as_ref()).await {
            Ok(capture) => Ok(self.install(capture)),
            Err(e) => {
                self.fail(&e);
                Err(ClientError::from_replacement(e))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::MediaTrack;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Devices that hand out scripted results and remember every stream.
    #[derive(Default)]
    struct ScriptedDevices {
        mic_failures: Mutex<VecDeque<MediaError>>,
        display_failures: Mutex<VecDeque<MediaError>>,
        issued: Mutex<Vec<MediaStream>>,
        requests: Mutex<Vec<AudioConstraints>>,
    }

    impl ScriptedDevices {
        fn live_mic_streams(&self) -> usize {
            self.issued
                .lock()
                .unwrap()
                .iter()
                .filter(|s| !s.has_video() && s.is_live())
                .count()
        }
    }

    #[async_trait]
    impl MediaDevices for ScriptedDevices {
        async fn get_user_media(
            &self,
            constraints: AudioConstraints,
        ) -> Result<MediaStream, MediaError> {
            self.requests.lock().unwrap().push(constraints);
            if let Some(err) = self.mic_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            let stream = MediaStream::new(vec![MediaTrack::audio("mic")]);
            self.issued.lock().unwrap().push(stream.clone());
            Ok(stream)
        }

        async fn get_display_media(&self) -> Result<MediaStream, MediaError> {
            if let Some(err) = self.display_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            let stream = MediaStream::new(vec![MediaTrack::video("screen")]);
            self.issued.lock().unwrap().push(stream.clone());
            Ok(stream)
        }
    }

    fn controller() -> (LocalMediaController, Arc<ScriptedDevices>) {
        let devices = Arc::new(ScriptedDevices::default());
        let controller = LocalMediaController::new(devices.clone(), true);
        (controller, devices)
    }

    #[tokio::test]
    async fn test_acquire_requests_voice_constraints() {
        let (mut media, devices) = controller();

        let stream = media.acquire(AudioConstraints::voice(true)).await.unwrap();

        assert!(stream.is_live());
        let requests = devices.requests.lock().unwrap();
        assert_eq!(requests.as_slice(), &[AudioConstraints::voice(true)]);
    }

    #[tokio::test]
    async fn test_acquire_failure_leaves_no_session() {
        let (mut media, devices) = controller();
        devices
            .mic_failures
            .lock()
            .unwrap()
            .push_back(MediaError::PermissionDenied("blocked".to_string()));

        let err = media.acquire(AudioConstraints::voice(true)).await.unwrap_err();

        assert_eq!(err, ClientError::PermissionDenied("blocked".to_string()));
        assert!(!media.has_stream());
    }

    #[tokio::test]
    async fn test_replace_stops_previous_tracks() {
        let (mut media, devices) = controller();
        let first = media.acquire(AudioConstraints::voice(true)).await.unwrap();

        let second = media.replace(AudioConstraints::voice(false)).await.unwrap();

        assert!(!first.is_live());
        assert!(second.is_live());
        assert_eq!(devices.live_mic_streams(), 1);
        assert!(!media.constraints().noise_suppression);
    }

    #[tokio::test]
    async fn test_replace_failure_is_voice_silent_and_keeps_policy() {
        let (mut media, devices) = controller();
        let first = media.acquire(AudioConstraints::voice(true)).await.unwrap();
        devices
            .mic_failures
            .lock()
            .unwrap()
            .push_back(MediaError::DeviceUnavailable("unplugged".to_string()));

        let err = media
            .replace(AudioConstraints::voice(false))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "replace_failed");
        assert!(!first.is_live(), "previous stream is not resurrected");
        assert!(!media.has_stream());
        assert!(media.constraints().noise_suppression);
    }

    #[tokio::test]
    async fn test_mic_flag_carries_over_replacement() {
        let (mut media, _devices) = controller();
        media.acquire(AudioConstraints::voice(true)).await.unwrap();
        assert!(media.set_mic_enabled(false));

        let replaced = media.replace(AudioConstraints::voice(false)).await.unwrap();

        assert!(replaced.audio_tracks().all(|t| !t.is_enabled()));
        assert!(!media.mic_enabled());
    }

    #[tokio::test]
    async fn test_cancelled_picker_keeps_current_stream() {
        let (mut media, devices) = controller();
        let current = media.acquire(AudioConstraints::voice(true)).await.unwrap();
        devices
            .display_failures
            .lock()
            .unwrap()
            .push_back(MediaError::Cancelled);

        let err = media.start_screen_share().await.unwrap_err();

        assert_eq!(err, ClientError::ShareCancelled);
        assert!(current.is_live());
        assert_eq!(media.current_stream().map(MediaStream::id), Some(current.id()));
        assert!(!media.is_screen_sharing());
    }

    #[tokio::test]
    async fn test_share_combines_display_video_with_fresh_mic() {
        let (mut media, _devices) = controller();
        let voice = media.acquire(AudioConstraints::voice(true)).await.unwrap();

        let shared = media.start_screen_share().await.unwrap();

        assert!(!voice.is_live());
        assert!(shared.has_video());
        assert!(shared.has_audio());
        assert!(media.is_screen_sharing());
    }

    #[tokio::test]
    async fn test_share_mic_failure_stops_display() {
        let (mut media, devices) = controller();
        media.acquire(AudioConstraints::voice(true)).await.unwrap();
        devices
            .mic_failures
            .lock()
            .unwrap()
            .push_back(MediaError::DeviceUnavailable("busy".to_string()));

        let err = media.start_screen_share().await.unwrap_err();

        assert_eq!(err.kind(), "replace_failed");
        assert!(devices.issued.lock().unwrap().iter().all(|s| !s.is_live()));
        assert!(!media.has_stream());
        assert!(!media.is_screen_sharing());
    }

    #[tokio::test]
    async fn test_stop_share_returns_to_microphone() {
        let (mut media, _devices) = controller();
        media.acquire(AudioConstraints::voice(true)).await.unwrap();
        let shared = media.start_screen_share().await.unwrap();

        let voice = media.stop_screen_share().await.unwrap();

        assert!(!shared.is_live());
        assert!(!voice.has_video());
        assert!(!media.is_screen_sharing());
    }

    #[tokio::test]
    async fn test_noise_suppression_refused_while_sharing() {
        let (mut media, _devices) = controller();
        media.acquire(AudioConstraints::voice(true)).await.unwrap();
        media.start_screen_share().await.unwrap();

        let result = media.noise_suppression_request();

        assert!(matches!(result, Err(ClientError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_noise_suppression_request_flips_flag() {
        let (mut media, _devices) = controller();
        media.acquire(AudioConstraints::voice(true)).await.unwrap();

        let request = media.noise_suppression_request().unwrap();

        assert_eq!(request.kind(), CaptureKind::Microphone);
        assert!(!request.constraints().noise_suppression);
    }

    #[tokio::test]
    async fn test_stop_ends_session() {
        let (mut media, devices) = controller();
        media.acquire(AudioConstraints::voice(true)).await.unwrap();

        media.stop();

        assert!(!media.has_stream());
        assert_eq!(devices.live_mic_streams(), 0);
    }

    #[test]
    fn test_set_mic_without_stream_only_records_flag() {
        let (mut media, _devices) = controller();
        assert!(!media.set_mic_enabled(false));
        assert!(!media.mic_enabled());

        media.reset_controls();
        assert!(media.mic_enabled());
    }
}
