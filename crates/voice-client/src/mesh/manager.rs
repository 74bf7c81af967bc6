//! `PeerMeshActor` - owns the local voice session and the call mesh.
//!
//! The actor reacts to four inputs: handle requests, relay events, transport
//! events and results from tasks it spawned. Captures run in spawned tasks
//! and report back tagged with the session epoch; leaving bumps the epoch,
//! so a capture that resolves afterwards is stopped and discarded.
//!
//! No call is placed or answered until the session is `Active`, which needs
//! both a mesh identity from the transport and a local stream. Inbound calls
//! that arrive earlier are deferred, never answered empty.

use crate::config::{LinkPolicy, MeshSettings};
use crate::errors::{ClientError, MediaError};
use crate::local_media::{Capture, CaptureRequest, LocalMediaController};
use crate::media::{MediaDevices, MediaStream};
use crate::router::{PlaybackSurface, RemoteStreamRouter};
use crate::signal::SignalChannel;
use crate::transport::{LinkId, MeshTransport, TransportEvent};

use super::link::{LinkTable, MeshLink};
use super::messages::{Internal, MediaPurpose, MeshEvent, MeshMessage, MeshState, MeshStatus};

use common::types::{MeshId, RoomId};
use signaling_protocol::{
    ClientEvent, JoinVoice, LeaveVoice, ParticipantInfo, ServerEvent, ToggleDeafen, ToggleMute,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Channel buffer size for handle requests.
const MESH_CHANNEL_BUFFER: usize = 64;

/// Channel buffer size for spawned-task results.
const INTERNAL_CHANNEL_BUFFER: usize = 64;

/// Events kept for slow UI subscribers before they lag.
const EVENT_CHANNEL_CAPACITY: usize = 128;

type ToggleReply = oneshot::Sender<Result<bool, ClientError>>;

/// Collaborators injected by the host.
#[derive(Clone)]
pub struct MeshDeps {
    pub devices: Arc<dyn MediaDevices>,
    pub transport: Arc<dyn MeshTransport>,
    pub signal: Arc<dyn SignalChannel>,
    pub surface: Arc<dyn PlaybackSurface>,
}

/// Handle to the `PeerMeshActor`.
#[derive(Clone)]
pub struct PeerMeshHandle {
    sender: mpsc::Sender<MeshMessage>,
    cancel_token: CancellationToken,
    events: broadcast::Sender<MeshEvent>,
}

impl PeerMeshHandle {
    /// Join `room_id`; resolves with our mesh identity once active.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` / `DeviceUnavailable` (capture), `Handshake`
    /// (transport), `Signal` (announce), `InvalidState` if not idle.
    pub async fn join_room(&self, room_id: RoomId) -> Result<MeshId, ClientError> {
        self.request(|respond_to| MeshMessage::JoinRoom {
            room_id,
            respond_to,
        })
        .await?
    }

    /// Leave the current room. Local tracks are stopped before this returns.
    pub async fn leave_room(&self) -> Result<(), ClientError> {
        self.request(|respond_to| MeshMessage::LeaveRoom { respond_to })
            .await?
    }

    /// Returns the new muted flag.
    pub async fn toggle_mic(&self) -> Result<bool, ClientError> {
        self.request(|respond_to| MeshMessage::ToggleMic { respond_to })
            .await?
    }

    /// Returns the new deafened flag.
    pub async fn toggle_deafen(&self) -> Result<bool, ClientError> {
        self.request(|respond_to| MeshMessage::ToggleDeafen { respond_to })
            .await?
    }

    /// Returns the new noise suppression flag.
    pub async fn toggle_noise_suppression(&self) -> Result<bool, ClientError> {
        self.request(|respond_to| MeshMessage::ToggleNoiseSuppression { respond_to })
            .await?
    }

    /// Returns whether we are sharing afterwards.
    pub async fn toggle_screen_share(&self) -> Result<bool, ClientError> {
        self.request(|respond_to| MeshMessage::ToggleScreenShare { respond_to })
            .await?
    }

    pub async fn get_state(&self) -> Result<MeshStatus, ClientError> {
        self.request(|respond_to| MeshMessage::GetState { respond_to })
            .await
    }

    /// Participants of `room_id` from the latest presence snapshot.
    pub async fn room_presence(&self, room_id: RoomId) -> Result<Vec<ParticipantInfo>, ClientError> {
        self.request(|respond_to| MeshMessage::GetPresence {
            room_id,
            respond_to,
        })
        .await
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MeshEvent> {
        self.events.subscribe()
    }

    /// Cancel the actor; an active session is left first.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> MeshMessage,
    ) -> Result<T, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| ClientError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ClientError::Internal(format!("response receive failed: {e}")))
    }
}

enum Session {
    Idle,
    Joining {
        room_id: RoomId,
        mesh_id: Option<MeshId>,
        respond_to: Option<oneshot::Sender<Result<MeshId, ClientError>>>,
    },
    Active {
        room_id: RoomId,
        mesh_id: MeshId,
    },
}

impl Session {
    fn state(&self) -> MeshState {
        match self {
            Session::Idle => MeshState::Idle,
            Session::Joining { .. } => MeshState::Joining,
            Session::Active { .. } => MeshState::Active,
        }
    }
}

/// A replacement capture in flight.
struct PendingMedia {
    purpose: MediaPurpose,
    respond_to: Option<ToggleReply>,
}

/// The `PeerMeshActor` implementation.
pub struct PeerMeshActor {
    settings: MeshSettings,
    receiver: mpsc::Receiver<MeshMessage>,
    internal_tx: mpsc::Sender<Internal>,
    internal_rx: mpsc::Receiver<Internal>,
    server_events: Option<mpsc::Receiver<ServerEvent>>,
    /// Per-session; dropped on leave.
    transport_events: Option<mpsc::Receiver<TransportEvent>>,
    cancel_token: CancellationToken,
    media: LocalMediaController,
    router: RemoteStreamRouter,
    transport: Arc<dyn MeshTransport>,
    signal: Arc<dyn SignalChannel>,
    events: broadcast::Sender<MeshEvent>,
    session: Session,
    epoch: u64,
    links: LinkTable,
    deferred_calls: Vec<(LinkId, MeshId)>,
    pending_media: Option<PendingMedia>,
    /// `NewcomerDials`: set once we have dialed the members listed before us.
    initial_dial_done: bool,
    deafened: bool,
    presence: Vec<ParticipantInfo>,
}

impl PeerMeshActor {
    /// Spawn the actor. `server_events` is the inbound half of the relay
    /// connection.
    pub fn spawn(
        settings: MeshSettings,
        deps: MeshDeps,
        server_events: mpsc::Receiver<ServerEvent>,
        cancel_token: CancellationToken,
    ) -> (PeerMeshHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(MESH_CHANNEL_BUFFER);
        let (internal_tx, internal_rx) = mpsc::channel(INTERNAL_CHANNEL_BUFFER);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let actor = Self {
            media: LocalMediaController::new(deps.devices, settings.noise_suppression),
            router: RemoteStreamRouter::new(deps.surface),
            transport: deps.transport,
            signal: deps.signal,
            settings,
            receiver,
            internal_tx,
            internal_rx,
            server_events: Some(server_events),
            transport_events: None,
            cancel_token: cancel_token.clone(),
            events: events.clone(),
            session: Session::Idle,
            epoch: 0,
            links: LinkTable::new(),
            deferred_calls: Vec::new(),
            pending_media: None,
            initial_dial_done: false,
            deafened: false,
            presence: Vec::new(),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = PeerMeshHandle {
            sender,
            cancel_token,
            events,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "client.mesh", fields(link_policy = %self.settings.link_policy))]
    async fn run(mut self) {
        info!(target: "client.mesh", "PeerMeshActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "client.mesh", "PeerMeshActor received cancellation signal");
                    self.leave().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    if let Some(message) = msg {
                        self.handle_message(message).await;
                    } else {
                        info!(target: "client.mesh", "PeerMeshActor channel closed, exiting");
                        self.leave().await;
                        break;
                    }
                }

                Some(internal) = self.internal_rx.recv() => {
                    self.handle_internal(internal).await;
                }

                event = recv_or_pending(&mut self.server_events) => {
                    if let Some(event) = event {
                        self.handle_server_event(event).await;
                    } else {
                        warn!(target: "client.mesh", "Relay event stream ended");
                        self.server_events = None;
                    }
                }

                event = recv_or_pending(&mut self.transport_events) => {
                    if let Some(event) = event {
                        self.handle_transport_event(event).await;
                    } else {
                        self.transport_lost().await;
                    }
                }
            }
        }

        info!(target: "client.mesh", "PeerMeshActor stopped");
    }

    async fn handle_message(&mut self, message: MeshMessage) {
        match message {
            MeshMessage::JoinRoom {
                room_id,
                respond_to,
            } => {
                self.begin_join(room_id, respond_to).await;
            }
            MeshMessage::LeaveRoom { respond_to } => {
                self.leave().await;
                let _ = respond_to.send(Ok(()));
            }
            MeshMessage::ToggleMic { respond_to } => {
                let result = self.toggle_mic().await;
                let _ = respond_to.send(result);
            }
            MeshMessage::ToggleDeafen { respond_to } => {
                let result = self.toggle_deafen().await;
                let _ = respond_to.send(result);
            }
            MeshMessage::ToggleNoiseSuppression { respond_to } => {
                let request = self.media.noise_suppression_request();
                self.begin_replacement(MediaPurpose::NoiseSuppression, request, Some(respond_to));
            }
            MeshMessage::ToggleScreenShare { respond_to } => {
                let (purpose, request) = if self.media.is_screen_sharing() {
                    (MediaPurpose::StopShare, self.media.stop_share_request())
                } else {
                    (MediaPurpose::StartShare, self.media.start_share_request())
                };
                self.begin_replacement(purpose, request, Some(respond_to));
            }
            MeshMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.status());
            }
            MeshMessage::GetPresence {
                room_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.presence_for(&room_id));
            }
        }
    }

    // --- Session lifecycle ---

    async fn begin_join(
        &mut self,
        room_id: RoomId,
        respond_to: oneshot::Sender<Result<MeshId, ClientError>>,
    ) {
        if !matches!(self.session, Session::Idle) {
            let _ = respond_to.send(Err(ClientError::InvalidState(
                "already joining or in voice".to_string(),
            )));
            return;
        }

        self.epoch += 1;
        info!(target: "client.mesh", room_id = %room_id, epoch = self.epoch, "Joining voice room");

        self.session = Session::Joining {
            room_id,
            mesh_id: None,
            respond_to: Some(respond_to),
        };

        let request = self.media.acquire_request(self.media.constraints());
        self.spawn_capture(MediaPurpose::Join, request);

        // Only starts the handshake; the identity arrives as a transport event.
        match self.transport.open().await {
            Ok(events) => self.transport_events = Some(events),
            Err(e) => self.fail_join(e.into()).await,
        }
    }

    /// Announce and go `Active` once both identity and stream exist.
    async fn try_activate(&mut self) {
        let Session::Joining {
            room_id,
            mesh_id: Some(mesh_id),
            ..
        } = &self.session
        else {
            return;
        };
        if !self.media.has_stream() {
            return;
        }
        let (room_id, mesh_id) = (room_id.clone(), mesh_id.clone());

        let announce = ClientEvent::JoinVoice(JoinVoice {
            room_id: room_id.clone(),
            mesh_id: mesh_id.clone(),
            display_name: self.settings.display_name.clone(),
        });
        if let Err(e) = self.signal.emit(announce).await {
            self.fail_join(e.into()).await;
            return;
        }

        let previous = std::mem::replace(
            &mut self.session,
            Session::Active {
                room_id: room_id.clone(),
                mesh_id: mesh_id.clone(),
            },
        );

        self.media.reset_controls();
        self.router.clear_all();
        self.router.set_deafened(false);
        self.deafened = false;
        self.initial_dial_done = false;

        info!(target: "client.mesh", room_id = %room_id, mesh_id = %mesh_id, "Voice session active");
        if let Session::Joining {
            respond_to: Some(tx),
            ..
        } = previous
        {
            let _ = tx.send(Ok(mesh_id));
        }
        self.publish(MeshEvent::StateChanged(MeshState::Active));

        for (link, from) in std::mem::take(&mut self.deferred_calls) {
            self.answer_call(link, from).await;
        }
        // The snapshot may already list us if the relay answered quickly.
        self.dial_from_snapshot().await;
    }

    async fn fail_join(&mut self, err: ClientError) {
        warn!(target: "client.mesh", error = %err, kind = err.kind(), "Join failed");
        self.teardown().await;

        if let Session::Joining {
            respond_to: Some(tx),
            ..
        } = std::mem::replace(&mut self.session, Session::Idle)
        {
            let _ = tx.send(Err(err));
        }
    }

    async fn leave(&mut self) {
        let previous = std::mem::replace(&mut self.session, Session::Idle);
        if matches!(previous, Session::Idle) {
            debug!(target: "client.mesh", "Leave requested while idle");
            return;
        }

        // Local device first; signaling after.
        self.teardown().await;

        match previous {
            Session::Joining { respond_to, .. } => {
                info!(target: "client.mesh", "Join abandoned");
                if let Some(tx) = respond_to {
                    let _ = tx.send(Err(ClientError::InvalidState(
                        "left before the session became active".to_string(),
                    )));
                }
            }
            Session::Active { room_id, mesh_id } => {
                self.emit(ClientEvent::LeaveVoice(LeaveVoice {})).await;
                info!(target: "client.mesh", room_id = %room_id, mesh_id = %mesh_id, "Left voice room");
                self.publish(MeshEvent::StateChanged(MeshState::Idle));
            }
            Session::Idle => {}
        }
    }

    /// Stop media, close every link and the transport, invalidate spawned
    /// work. Does not touch `self.session`.
    async fn teardown(&mut self) {
        self.epoch += 1;
        self.media.stop();

        if let Some(pending) = self.pending_media.take() {
            debug!(target: "client.mesh", purpose = ?pending.purpose, "Pending media change abandoned");
            if let Some(tx) = pending.respond_to {
                let _ = tx.send(Err(ClientError::InvalidState("left voice".to_string())));
            }
        }

        for link in self.links.drain() {
            self.transport.close_link(link.link_id).await;
        }
        self.deferred_calls.clear();
        self.transport_events = None;
        self.transport.shutdown().await;

        self.router.clear_all();
        self.deafened = false;
        self.initial_dial_done = false;
    }

    async fn transport_lost(&mut self) {
        self.transport_events = None;
        match self.session {
            Session::Joining { .. } => {
                self.fail_join(ClientError::Handshake("transport closed".to_string()))
                    .await;
            }
            Session::Active { .. } => {
                warn!(target: "client.mesh", "Mesh transport closed; existing links will not recover");
            }
            Session::Idle => {}
        }
    }

    // --- Local controls ---

    fn active_room(&self) -> Result<RoomId, ClientError> {
        match &self.session {
            Session::Active { room_id, .. } => Ok(room_id.clone()),
            _ => Err(ClientError::InvalidState("not in voice".to_string())),
        }
    }

    async fn toggle_mic(&mut self) -> Result<bool, ClientError> {
        let room_id = self.active_room()?;
        if !self.media.has_stream() {
            return Err(ClientError::InvalidState("no local stream".to_string()));
        }

        let enabled = !self.media.mic_enabled();
        self.media.set_mic_enabled(enabled);
        self.emit(ClientEvent::ToggleMute(ToggleMute {
            room_id,
            is_muted: !enabled,
        }))
        .await;

        Ok(!enabled)
    }

    async fn toggle_deafen(&mut self) -> Result<bool, ClientError> {
        let room_id = self.active_room()?;

        let deafened = !self.deafened;
        self.deafened = deafened;
        self.router.set_deafened(deafened);
        self.emit(ClientEvent::ToggleDeafen(ToggleDeafen {
            room_id: room_id.clone(),
            is_deafened: deafened,
        }))
        .await;

        // Deafening mutes the mic, even while voice-silent so the next capture
        // starts muted; un-deafening leaves it muted.
        if deafened && self.media.mic_enabled() {
            self.media.set_mic_enabled(false);
            self.emit(ClientEvent::ToggleMute(ToggleMute {
                room_id,
                is_muted: true,
            }))
            .await;
        }

        Ok(deafened)
    }

    fn begin_replacement(
        &mut self,
        purpose: MediaPurpose,
        request: Result<CaptureRequest, ClientError>,
        respond_to: Option<ToggleReply>,
    ) {
        let refusal = if self.active_room().is_err() {
            Some(ClientError::InvalidState("not in voice".to_string()))
        } else if self.pending_media.is_some() {
            Some(ClientError::InvalidState(
                "a media change is already in progress".to_string(),
            ))
        } else {
            None
        };

        let request = match (refusal, request) {
            (Some(err), _) | (None, Err(err)) => {
                debug!(target: "client.mesh", ?purpose, error = %err, "Media change refused");
                if let Some(tx) = respond_to {
                    let _ = tx.send(Err(err));
                }
                return;
            }
            (None, Ok(request)) => request,
        };

        self.pending_media = Some(PendingMedia {
            purpose,
            respond_to,
        });
        self.spawn_capture(purpose, request);
    }

    async fn finish_replacement(
        &mut self,
        purpose: MediaPurpose,
        result: Result<Capture, MediaError>,
    ) {
        let respond_to = self.pending_media.take().and_then(|p| p.respond_to);
        let automatic = respond_to.is_none();

        let outcome = match result {
            Ok(capture) => {
                let stream = self.media.install(capture);
                if purpose == MediaPurpose::StartShare {
                    self.watch_share_end(&stream);
                }
                self.recall_all().await;
                Ok(match purpose {
                    MediaPurpose::NoiseSuppression => self.media.constraints().noise_suppression,
                    _ => self.media.is_screen_sharing(),
                })
            }
            Err(e) => {
                self.media.fail(&e);
                let err = ClientError::from_replacement(e);
                if err != ClientError::ShareCancelled {
                    warn!(target: "client.mesh", ?purpose, error = %err, "Stream replacement failed");
                }
                Err(err)
            }
        };

        if automatic && purpose == MediaPurpose::StopShare {
            self.publish(MeshEvent::LocalShareEnded);
        }
        if let Some(tx) = respond_to {
            let _ = tx.send(outcome);
        }
    }

    fn spawn_capture(&self, purpose: MediaPurpose, request: CaptureRequest) {
        let devices = self.media.devices();
        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = request.execute(devices.as_ref()).await;
            let _ = tx
                .send(Internal::Captured {
                    epoch,
                    purpose,
                    result,
                })
                .await;
        });
    }

    fn watch_share_end(&self, stream: &MediaStream) {
        let Some(video) = stream.video_tracks().next().cloned() else {
            return;
        };
        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        let stream_id = stream.id();
        tokio::spawn(async move {
            video.ended().await;
            let _ = tx.send(Internal::ShareEnded { epoch, stream_id }).await;
        });
    }

    // --- Spawned-task results ---

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Captured {
                epoch,
                purpose,
                result,
            } => {
                if epoch != self.epoch {
                    if let Ok(capture) = result {
                        capture.stream.stop_all();
                    }
                    debug!(target: "client.mesh", ?purpose, "Discarded capture from an ended session");
                    return;
                }
                match (purpose, result) {
                    (MediaPurpose::Join, Ok(capture)) => {
                        self.media.install(capture);
                        self.try_activate().await;
                    }
                    (MediaPurpose::Join, Err(e)) => self.fail_join(e.into()).await,
                    (purpose, result) => self.finish_replacement(purpose, result).await,
                }
            }
            Internal::CallSetupCheck { epoch, peer, link } => {
                let stalled = epoch == self.epoch
                    && self
                        .links
                        .get(&peer)
                        .is_some_and(|l| l.link_id == link && l.inbound_stream.is_none());
                if stalled {
                    warn!(target: "client.mesh", peer = %peer, link = %link, "Call setup timed out");
                    self.publish(MeshEvent::CallSetupTimedOut { peer });
                }
            }
            Internal::ShareEnded { epoch, stream_id } => {
                let current = self.media.current_stream().map(MediaStream::id);
                if epoch != self.epoch
                    || !self.media.is_screen_sharing()
                    || current != Some(stream_id)
                    || self.pending_media.is_some()
                {
                    return;
                }
                info!(target: "client.mesh", "Screen share ended outside the client, restoring microphone");
                let request = self.media.stop_share_request();
                self.begin_replacement(MediaPurpose::StopShare, request, None);
            }
        }
    }

    // --- Relay events ---

    async fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::VoiceUsersUpdate(participants) => {
                self.presence = participants;
                self.publish(MeshEvent::PresenceUpdated(self.presence.clone()));
                self.dial_from_snapshot().await;
            }
            ServerEvent::PeerJoined(peer) => self.on_peer_joined(peer).await,
            ServerEvent::PeerLeft(peer) => self.on_peer_left(peer).await,
            ServerEvent::Error(payload) => {
                warn!(target: "client.mesh", code = payload.code, message = %payload.message, "Relay rejected a frame");
                self.publish(MeshEvent::RelayError {
                    code: payload.code,
                    message: payload.message,
                });
            }
        }
    }

    /// `NewcomerDials`: once the snapshot lists us, dial every room member
    /// listed before us.
    async fn dial_from_snapshot(&mut self) {
        if self.settings.link_policy != LinkPolicy::NewcomerDials || self.initial_dial_done {
            return;
        }
        let Session::Active { room_id, mesh_id } = &self.session else {
            return;
        };

        let room: Vec<&ParticipantInfo> = self
            .presence
            .iter()
            .filter(|p| &p.room_id == room_id)
            .collect();
        let Some(own_index) = room.iter().position(|p| &p.mesh_id == mesh_id) else {
            return;
        };
        let earlier: Vec<MeshId> = room
            .iter()
            .take(own_index)
            .map(|p| p.mesh_id.clone())
            .filter(|peer| !self.links.contains(peer))
            .collect();

        self.initial_dial_done = true;
        debug!(target: "client.mesh", count = earlier.len(), "Dialing earlier room members");
        for peer in earlier {
            self.place_call(peer).await;
        }
    }

    async fn on_peer_joined(&mut self, peer: MeshId) {
        let Session::Active { mesh_id, .. } = &self.session else {
            return;
        };
        if &peer == mesh_id {
            return;
        }

        info!(target: "client.mesh", peer = %peer, "Peer joined");
        self.publish(MeshEvent::PeerJoined(peer.clone()));

        if self.settings.link_policy == LinkPolicy::NoticeRecipientDials {
            self.place_call(peer).await;
        }
    }

    async fn on_peer_left(&mut self, peer: MeshId) {
        if !matches!(self.session, Session::Active { .. }) {
            return;
        }

        if let Some(link) = self.links.remove(&peer) {
            self.transport.close_link(link.link_id).await;
        }

        let before = self.router.screen_holder().cloned();
        self.router.peer_left(&peer);
        self.publish_claim_change(before);

        info!(target: "client.mesh", peer = %peer, "Peer left");
        self.publish(MeshEvent::PeerLeft(peer));
    }

    // --- Transport events ---

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Ready { mesh_id } => {
                if let Session::Joining { mesh_id: slot, .. } = &mut self.session {
                    info!(target: "client.mesh", mesh_id = %mesh_id, "Mesh identity ready");
                    *slot = Some(mesh_id);
                } else {
                    debug!(target: "client.mesh", "Ignoring ready outside of join");
                    return;
                }
                self.try_activate().await;
            }
            TransportEvent::HandshakeFailed { reason } => {
                if matches!(self.session, Session::Joining { .. }) {
                    self.fail_join(ClientError::Handshake(reason)).await;
                } else {
                    warn!(target: "client.mesh", reason = %reason, "Handshake failure outside of join");
                }
            }
            TransportEvent::IncomingCall { link, from } => match self.session {
                Session::Joining { .. } => {
                    debug!(target: "client.mesh", peer = %from, "Deferring inbound call until active");
                    self.deferred_calls.push((link, from));
                }
                Session::Active { .. } => self.answer_call(link, from).await,
                Session::Idle => self.transport.close_link(link).await,
            },
            TransportEvent::RemoteStream { link, from, stream } => {
                self.on_remote_stream(link, &from, &stream);
            }
            TransportEvent::LinkClosed { link } => {
                if let Some(closed) = self.links.remove_by_link(link) {
                    debug!(target: "client.mesh", peer = %closed.peer, link = %link, "Link closed by far side");
                }
            }
        }
    }

    async fn answer_call(&mut self, link: LinkId, from: MeshId) {
        let Some(stream) = self.media.current_stream().cloned() else {
            warn!(target: "client.mesh", peer = %from, "Rejecting inbound call, no local stream");
            self.transport.close_link(link).await;
            return;
        };

        if let Err(e) = self.transport.answer(link, stream).await {
            warn!(target: "client.mesh", peer = %from, error = %e, "Failed to answer call");
            return;
        }

        if let Some(old) = self.links.insert(MeshLink::inbound(link, from.clone())) {
            if old.link_id != link {
                self.transport.close_link(old.link_id).await;
                debug!(target: "client.mesh", peer = %from, "Replaced existing link");
            }
        }
        info!(target: "client.mesh", peer = %from, link = %link, "Answered inbound call");
    }

    async fn place_call(&mut self, peer: MeshId) {
        let Some(stream) = self.media.current_stream().cloned() else {
            warn!(target: "client.mesh", peer = %peer, "Not calling, no local stream");
            return;
        };

        match self.transport.call(&peer, stream).await {
            Ok(link) => {
                if let Some(old) = self.links.insert(MeshLink::outbound(link, peer.clone())) {
                    if old.link_id != link {
                        self.transport.close_link(old.link_id).await;
                    }
                }
                info!(target: "client.mesh", peer = %peer, link = %link, "Placed call");
                self.arm_watchdog(peer, link);
            }
            Err(e) => {
                warn!(target: "client.mesh", peer = %peer, error = %e, "Failed to place call");
            }
        }
    }

    /// Re-issue a call carrying the current stream to every linked peer.
    async fn recall_all(&mut self) {
        let peers = self.links.peers();
        debug!(target: "client.mesh", count = peers.len(), "Re-calling linked peers");
        for peer in peers {
            self.place_call(peer).await;
        }
    }

    fn arm_watchdog(&self, peer: MeshId, link: LinkId) {
        let Some(timeout) = self.settings.call_setup_timeout else {
            return;
        };
        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(Internal::CallSetupCheck { epoch, peer, link }).await;
        });
    }

    fn on_remote_stream(&mut self, link: LinkId, from: &MeshId, stream: &MediaStream) {
        if !matches!(self.session, Session::Active { .. }) {
            return;
        }
        let Some(peer) = self.links.record_stream(link, stream.id()) else {
            debug!(target: "client.mesh", peer = %from, link = %link, "Stream on a replaced link ignored");
            return;
        };

        let before = self.router.screen_holder().cloned();
        let kind = self.router.route(&peer, stream);
        debug!(target: "client.mesh", peer = %peer, ?kind, "Remote stream routed");
        self.publish_claim_change(before);
    }

    // --- Helpers ---

    fn publish_claim_change(&self, before: Option<MeshId>) {
        let after = self.router.screen_holder().cloned();
        if before == after {
            return;
        }
        if let Some(peer) = before {
            self.publish(MeshEvent::ScreenShareEnded { peer });
        }
        if let Some(peer) = after {
            let display_name = self
                .presence
                .iter()
                .find(|p| p.mesh_id == peer)
                .map(|p| p.display_name.clone());
            self.publish(MeshEvent::ScreenShareStarted { peer, display_name });
        }
    }

    async fn emit(&self, event: ClientEvent) {
        let name = event.name();
        if let Err(e) = self.signal.emit(event).await {
            warn!(target: "client.mesh", event = name, error = %e, "Failed to send signaling event");
        }
    }

    fn publish(&self, event: MeshEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn status(&self) -> MeshStatus {
        let (room_id, mesh_id) = match &self.session {
            Session::Idle => (None, None),
            Session::Joining {
                room_id, mesh_id, ..
            } => (Some(room_id.clone()), mesh_id.clone()),
            Session::Active { room_id, mesh_id } => (Some(room_id.clone()), Some(mesh_id.clone())),
        };
        let state = self.session.state();

        MeshStatus {
            state,
            room_id,
            mesh_id,
            mic_muted: !self.media.mic_enabled(),
            deafened: self.deafened,
            screen_sharing: self.media.is_screen_sharing(),
            noise_suppression: self.media.constraints().noise_suppression,
            voice_silent: state == MeshState::Active && !self.media.has_stream(),
            links: self.links.len(),
            screen_holder: self.router.screen_holder().cloned(),
            voice_sinks: self.router.voice_sink_count(),
        }
    }

    fn presence_for(&self, room_id: &RoomId) -> Vec<ParticipantInfo> {
        self.presence
            .iter()
            .filter(|p| &p.room_id == room_id)
            .cloned()
            .collect()
    }
}

async fn recv_or_pending<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
