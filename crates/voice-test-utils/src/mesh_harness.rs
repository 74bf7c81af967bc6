//! Single voice client with a scripted relay.
//!
//! The test plays the relay: it pushes `ServerEvent`s into the client and
//! inspects what the client emitted through `RecordingSignalChannel`.

use crate::fake_media::FakeMediaDevices;
use crate::fake_mesh::{FakeMeshNetwork, FakeMeshTransport};
use crate::fake_signal::RecordingSignalChannel;
use crate::fake_surface::RecordingSurface;
use crate::relay_harness::next_event;
use signaling_protocol::{ParticipantInfo, ServerEvent};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use voice_client::config::MeshSettings;
use voice_client::mesh::{MeshDeps, MeshEvent, MeshStatus, PeerMeshActor, PeerMeshHandle};

pub struct TestMesh {
    pub handle: PeerMeshHandle,
    pub devices: Arc<FakeMediaDevices>,
    pub transport: Arc<FakeMeshTransport>,
    pub signal: Arc<RecordingSignalChannel>,
    pub surface: Arc<RecordingSurface>,
    pub events: broadcast::Receiver<MeshEvent>,
    server_tx: mpsc::Sender<ServerEvent>,
    task: Option<JoinHandle<()>>,
}

impl TestMesh {
    /// Spawn a client whose transport is granted `mesh_id` on `network`.
    pub fn spawn(network: &FakeMeshNetwork, mesh_id: &str, settings: MeshSettings) -> Self {
        let devices = Arc::new(FakeMediaDevices::new());
        let transport = Arc::new(network.transport(mesh_id));
        let signal = Arc::new(RecordingSignalChannel::new());
        let surface = Arc::new(RecordingSurface::new());
        let (server_tx, server_rx) = mpsc::channel(64);

        let deps = MeshDeps {
            devices: devices.clone(),
            transport: transport.clone(),
            signal: signal.clone(),
            surface: surface.clone(),
        };
        let (handle, task) =
            PeerMeshActor::spawn(settings, deps, server_rx, CancellationToken::new());
        let events = handle.subscribe();

        Self {
            handle,
            devices,
            transport,
            signal,
            surface,
            events,
            server_tx,
            task: Some(task),
        }
    }

    /// Deliver a relay event to the client.
    pub async fn relay(&self, event: ServerEvent) {
        self.server_tx
            .send(event)
            .await
            .expect("mesh actor stopped");
    }

    /// Deliver a presence snapshot.
    pub async fn snapshot(&self, participants: Vec<ParticipantInfo>) {
        self.relay(ServerEvent::VoiceUsersUpdate(participants)).await;
    }

    pub async fn status(&self) -> MeshStatus {
        self.handle.get_state().await.expect("mesh actor stopped")
    }

    pub async fn wait_for(&mut self, predicate: impl FnMut(&MeshEvent) -> bool) -> MeshEvent {
        next_event(&mut self.events, predicate).await
    }

    /// Cancel the actor and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.handle.cancel();
        if let Some(task) = self.task.take() {
            task.await.expect("mesh actor panicked");
        }
    }
}

impl Drop for TestMesh {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
