//! Test harnesses for end-to-end tests.
//!
//! Provides `TestRelayServer` for spawning a real relay on an ephemeral
//! port, `TestWsClient` for speaking the wire protocol directly, and
//! `TestVoiceClient` for a full voice client wired to fakes.

use crate::fake_media::FakeMediaDevices;
use crate::fake_mesh::{FakeMeshNetwork, FakeMeshTransport};
use crate::fake_surface::RecordingSurface;
use crate::fixtures;
use futures::{SinkExt, StreamExt};
use relay_service::actors::{RelayActor, RelayActorHandle};
use relay_service::config::{Config, SnapshotScope};
use relay_service::routes::{self, AppState};
use signaling_protocol::{decode_server_event, encode_client_event, ClientEvent, ServerEvent};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use voice_client::config::MeshSettings;
use voice_client::mesh::{MeshDeps, MeshEvent, PeerMeshActor, PeerMeshHandle};
use voice_client::signal::WsSignalChannel;

/// How long harness helpers wait before failing a test.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Test harness for spawning the signal relay in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_snapshot_on_join() -> Result<()> {
///     let server = TestRelayServer::spawn().await?;
///     let mut client = TestWsClient::connect(&server.ws_url()).await?;
///
///     client.send(&fixtures::join_voice("voice-lounge", "p1", "X")).await?;
///     let event = client.recv().await?;
///     assert!(matches!(event, ServerEvent::VoiceUsersUpdate(_)));
///     Ok(())
/// }
/// ```
pub struct TestRelayServer {
    addr: SocketAddr,
    relay: RelayActorHandle,
    config: Config,
    _relay_task: JoinHandle<()>,
    server_task: JoinHandle<()>,
}

impl TestRelayServer {
    /// Spawn a relay with default settings (global snapshot scope).
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(&[]).await
    }

    /// Spawn a relay with room-scoped snapshots.
    pub async fn spawn_room_scoped() -> Result<Self, anyhow::Error> {
        Self::spawn_with(&[("RELAY_SNAPSHOT_SCOPE", SnapshotScope::Room.as_str())]).await
    }

    /// Spawn a relay with extra `RELAY_*` settings.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Run the real relay actor and signaling routes in the background
    pub async fn spawn_with(overrides: &[(&str, &str)]) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("RELAY_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("RELAY_ID".to_string(), "relay-test".to_string()),
        ]);
        for (key, value) in overrides {
            vars.insert((*key).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let token = CancellationToken::new();
        let (relay, relay_task) =
            RelayActor::spawn(config.relay_id.clone(), config.snapshot_scope, token);

        let state = Arc::new(AppState {
            relay: relay.clone(),
            config: config.clone(),
        });
        let app = routes::build_routes(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let server_task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test relay error: {}", e);
            }
        });

        Ok(Self {
            addr,
            relay,
            config,
            _relay_task: relay_task,
            server_task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `ws://127.0.0.1:<port>/ws`
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn relay(&self) -> &RelayActorHandle {
        &self.relay
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestRelayServer {
    fn drop(&mut self) {
        self.relay.cancel();
        self.server_task.abort();
    }
}

/// Raw signaling client speaking the wire format.
pub struct TestWsClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestWsClient {
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", url, e))?;
        Ok(Self { ws })
    }

    pub async fn send(&mut self, event: &ClientEvent) -> Result<(), anyhow::Error> {
        let frame = encode_client_event(event)?;
        self.send_raw(&frame).await
    }

    /// Send an arbitrary text frame.
    pub async fn send_raw(&mut self, frame: &str) -> Result<(), anyhow::Error> {
        self.ws.send(Message::Text(frame.to_string())).await?;
        Ok(())
    }

    /// Next server event, failing after [`DEFAULT_WAIT`].
    pub async fn recv(&mut self) -> Result<ServerEvent, anyhow::Error> {
        loop {
            let msg = tokio::time::timeout(DEFAULT_WAIT, self.ws.next())
                .await
                .map_err(|_| anyhow::anyhow!("Timed out waiting for a server event"))?;
            match msg {
                Some(Ok(Message::Text(text))) => return Ok(decode_server_event(&text)?),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(anyhow::anyhow!("Connection closed"));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Skip events until one matches `predicate`.
    pub async fn recv_until(
        &mut self,
        mut predicate: impl FnMut(&ServerEvent) -> bool,
    ) -> Result<ServerEvent, anyhow::Error> {
        loop {
            let event = self.recv().await?;
            if predicate(&event) {
                return Ok(event);
            }
        }
    }

    /// Assert nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<(), anyhow::Error> {
        match tokio::time::timeout(window, self.ws.next()).await {
            Err(_) => Ok(()),
            Ok(Some(Ok(Message::Text(text)))) => {
                Err(anyhow::anyhow!("Unexpected server frame: {}", text))
            }
            Ok(_) => Ok(()),
        }
    }

    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.ws.close(None).await?;
        Ok(())
    }
}

/// A full voice client connected to a real relay, with fake devices,
/// transport and playback.
pub struct TestVoiceClient {
    pub handle: PeerMeshHandle,
    pub devices: Arc<FakeMediaDevices>,
    pub transport: Arc<FakeMeshTransport>,
    pub surface: Arc<RecordingSurface>,
    pub events: broadcast::Receiver<MeshEvent>,
    signal: Arc<WsSignalChannel>,
    _task: JoinHandle<()>,
}

impl TestVoiceClient {
    /// Connect with default test settings; the transport is granted `mesh_id`.
    pub async fn connect(
        server: &TestRelayServer,
        network: &FakeMeshNetwork,
        mesh_id: &str,
        display_name: &str,
    ) -> Result<Self, anyhow::Error> {
        Self::connect_with(server, network, mesh_id, fixtures::settings(display_name)).await
    }

    pub async fn connect_with(
        server: &TestRelayServer,
        network: &FakeMeshNetwork,
        mesh_id: &str,
        settings: MeshSettings,
    ) -> Result<Self, anyhow::Error> {
        let token = CancellationToken::new();
        let (signal, server_events) =
            WsSignalChannel::connect(&server.ws_url(), token.child_token()).await?;
        let signal = Arc::new(signal);

        let devices = Arc::new(FakeMediaDevices::new());
        let transport = Arc::new(network.transport(mesh_id));
        let surface = Arc::new(RecordingSurface::new());

        let deps = MeshDeps {
            devices: devices.clone(),
            transport: transport.clone(),
            signal: signal.clone(),
            surface: surface.clone(),
        };
        let (handle, task) = PeerMeshActor::spawn(settings, deps, server_events, token);
        let events = handle.subscribe();

        Ok(Self {
            handle,
            devices,
            transport,
            surface,
            events,
            signal,
            _task: task,
        })
    }

    /// Wait for the next mesh event matching `predicate`.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&MeshEvent) -> bool) -> MeshEvent {
        next_event(&mut self.events, predicate).await
    }

    /// Drop the relay connection without leaving voice.
    pub fn disconnect(&self) {
        self.signal.close();
    }
}

impl Drop for TestVoiceClient {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

/// Wait for the next event matching `predicate`, panicking after [`DEFAULT_WAIT`].
pub async fn next_event<E: Clone>(
    events: &mut broadcast::Receiver<E>,
    mut predicate: impl FnMut(&E) -> bool,
) -> E {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    };
    tokio::time::timeout(DEFAULT_WAIT, wait)
        .await
        .expect("timed out waiting for event")
}

/// Poll `check` until it holds, panicking after [`DEFAULT_WAIT`].
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + DEFAULT_WAIT;
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
