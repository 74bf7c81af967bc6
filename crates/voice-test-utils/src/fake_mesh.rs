//! In-process peer network.
//!
//! Every [`FakeMeshTransport`] created from one [`FakeMeshNetwork`] can call
//! every other registered endpoint. Calls, answers and closes are delivered
//! as [`TransportEvent`]s on each endpoint's channel, in order, so two real
//! `PeerMeshActor`s can link up without any media stack.
//!
//! Answering a call delivers both streams: the answer to the caller and the
//! offer to the callee.

use async_trait::async_trait;
use common::types::{MeshId, StreamId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use voice_client::errors::TransportError;
use voice_client::media::MediaStream;
use voice_client::transport::{LinkId, MeshTransport, TransportEvent};

const ENDPOINT_BUFFER: usize = 256;

/// One call placed on the network.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub link: LinkId,
    pub from: MeshId,
    pub to: MeshId,
    pub stream_id: StreamId,
    pub has_video: bool,
}

struct LinkEnds {
    caller: MeshId,
    callee: MeshId,
    offer: MediaStream,
}

#[derive(Default)]
struct NetworkState {
    endpoints: HashMap<MeshId, mpsc::Sender<TransportEvent>>,
    links: HashMap<LinkId, LinkEnds>,
    calls: Vec<CallRecord>,
    answers: Vec<LinkId>,
    closed: Vec<LinkId>,
    next_endpoint: u64,
}

impl NetworkState {
    fn deliver(&self, to: &MeshId, event: TransportEvent) {
        if let Some(tx) = self.endpoints.get(to) {
            let _ = tx.try_send(event);
        }
    }
}

/// Shared in-memory network.
#[derive(Clone, Default)]
pub struct FakeMeshNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl FakeMeshNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that is granted `mesh_id` on open.
    pub fn transport(&self, mesh_id: impl Into<MeshId>) -> FakeMeshTransport {
        FakeMeshTransport {
            network: self.clone(),
            mesh_id: Mutex::new(Some(mesh_id.into())),
            mode: Mutex::new(HandshakeMode::Ready),
            ready_tx: Mutex::new(None),
            opens: Mutex::new(0),
        }
    }

    /// A transport that is granted a generated identity on each open.
    pub fn transport_with_generated_id(&self) -> FakeMeshTransport {
        FakeMeshTransport {
            network: self.clone(),
            mesh_id: Mutex::new(None),
            mode: Mutex::new(HandshakeMode::Ready),
            ready_tx: Mutex::new(None),
            opens: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls placed by `from` to `to`.
    pub fn calls_between(&self, from: &MeshId, to: &MeshId) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|c| &c.from == from && &c.to == to)
            .collect()
    }

    pub fn answered(&self, link: LinkId) -> bool {
        self.state.lock().unwrap().answers.contains(&link)
    }

    pub fn closed_links(&self) -> Vec<LinkId> {
        self.state.lock().unwrap().closed.clone()
    }

    /// Links currently open on the network.
    pub fn open_links(&self) -> usize {
        self.state.lock().unwrap().links.len()
    }

    pub fn is_registered(&self, mesh_id: &MeshId) -> bool {
        self.state.lock().unwrap().endpoints.contains_key(mesh_id)
    }

    fn register(&self, requested: Option<MeshId>) -> (MeshId, mpsc::Receiver<TransportEvent>, mpsc::Sender<TransportEvent>) {
        let mut state = self.state.lock().unwrap();
        let mesh_id = requested.unwrap_or_else(|| {
            state.next_endpoint += 1;
            MeshId::new(format!("mesh-{}", state.next_endpoint))
        });
        let (tx, rx) = mpsc::channel(ENDPOINT_BUFFER);
        state.endpoints.insert(mesh_id.clone(), tx.clone());
        (mesh_id, rx, tx)
    }

    fn unregister(&self, mesh_id: &MeshId) {
        let mut state = self.state.lock().unwrap();
        state.endpoints.remove(mesh_id);

        let owned: Vec<LinkId> = state
            .links
            .iter()
            .filter(|(_, ends)| &ends.caller == mesh_id || &ends.callee == mesh_id)
            .map(|(link, _)| *link)
            .collect();
        for link in owned {
            if let Some(ends) = state.links.remove(&link) {
                let other = if &ends.caller == mesh_id {
                    ends.callee
                } else {
                    ends.caller
                };
                state.closed.push(link);
                state.deliver(&other, TransportEvent::LinkClosed { link });
            }
        }
    }
}

/// How a transport completes its handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMode {
    /// `Ready` is delivered as soon as `open` returns.
    Ready,
    /// `HandshakeFailed` is delivered instead.
    Fail(String),
    /// `open` itself errors.
    Refuse(String),
    /// Nothing is delivered until [`FakeMeshTransport::complete_handshake`].
    Manual,
}

pub struct FakeMeshTransport {
    network: FakeMeshNetwork,
    mesh_id: Mutex<Option<MeshId>>,
    mode: Mutex<HandshakeMode>,
    /// Our own endpoint sender, kept for `complete_handshake`.
    ready_tx: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    opens: Mutex<usize>,
}

impl FakeMeshTransport {
    pub fn set_mode(&self, mode: HandshakeMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Identity of the current (or last) session.
    pub fn mesh_id(&self) -> Option<MeshId> {
        self.mesh_id.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        *self.opens.lock().unwrap()
    }

    pub fn network(&self) -> &FakeMeshNetwork {
        &self.network
    }

    /// Deliver `Ready` for a transport opened in `Manual` mode.
    pub fn complete_handshake(&self) {
        let mesh_id = self.mesh_id().expect("transport was never opened");
        let tx = self.ready_tx.lock().unwrap().clone();
        tx.expect("transport was never opened")
            .try_send(TransportEvent::Ready { mesh_id })
            .expect("endpoint channel full or closed");
    }

    /// Deliver an arbitrary event to this endpoint, as the network would.
    pub fn inject(&self, event: TransportEvent) {
        let tx = self.ready_tx.lock().unwrap().clone();
        tx.expect("transport was never opened")
            .try_send(event)
            .expect("endpoint channel full or closed");
    }

    fn own_id(&self) -> Result<MeshId, TransportError> {
        self.mesh_id().ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl MeshTransport for FakeMeshTransport {
    async fn open(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        *self.opens.lock().unwrap() += 1;
        let mode = self.mode.lock().unwrap().clone();
        if let HandshakeMode::Refuse(reason) = mode {
            return Err(TransportError::Handshake(reason));
        }

        let requested = self.mesh_id.lock().unwrap().clone();
        let (mesh_id, rx, tx) = self.network.register(requested);
        *self.mesh_id.lock().unwrap() = Some(mesh_id.clone());
        *self.ready_tx.lock().unwrap() = Some(tx.clone());

        match mode {
            HandshakeMode::Ready => {
                let _ = tx.try_send(TransportEvent::Ready { mesh_id });
            }
            HandshakeMode::Fail(reason) => {
                let _ = tx.try_send(TransportEvent::HandshakeFailed { reason });
            }
            HandshakeMode::Manual | HandshakeMode::Refuse(_) => {}
        }
        Ok(rx)
    }

    async fn call(&self, peer: &MeshId, stream: MediaStream) -> Result<LinkId, TransportError> {
        let from = self.own_id()?;
        let mut state = self.network.state.lock().unwrap();
        if !state.endpoints.contains_key(peer) {
            return Err(TransportError::Call(format!("peer {peer} is not reachable")));
        }

        let link = LinkId::new();
        state.calls.push(CallRecord {
            link,
            from: from.clone(),
            to: peer.clone(),
            stream_id: stream.id(),
            has_video: stream.has_video(),
        });
        state.links.insert(
            link,
            LinkEnds {
                caller: from.clone(),
                callee: peer.clone(),
                offer: stream,
            },
        );
        state.deliver(peer, TransportEvent::IncomingCall { link, from });
        Ok(link)
    }

    async fn answer(&self, link: LinkId, stream: MediaStream) -> Result<(), TransportError> {
        let mut state = self.network.state.lock().unwrap();
        let Some(ends) = state.links.get(&link) else {
            return Err(TransportError::Call(format!("link {link} is not open")));
        };
        let (caller, callee, offer) = (ends.caller.clone(), ends.callee.clone(), ends.offer.clone());

        state.answers.push(link);
        state.deliver(
            &caller,
            TransportEvent::RemoteStream {
                link,
                from: callee.clone(),
                stream,
            },
        );
        state.deliver(
            &callee,
            TransportEvent::RemoteStream {
                link,
                from: caller,
                stream: offer,
            },
        );
        Ok(())
    }

    async fn close_link(&self, link: LinkId) {
        let Some(own) = self.mesh_id() else { return };
        let mut state = self.network.state.lock().unwrap();
        if let Some(ends) = state.links.remove(&link) {
            let other = if ends.caller == own {
                ends.callee
            } else {
                ends.caller
            };
            state.closed.push(link);
            state.deliver(&other, TransportEvent::LinkClosed { link });
        }
    }

    async fn shutdown(&self) {
        if let Some(mesh_id) = self.mesh_id() {
            self.network.unregister(&mesh_id);
        }
        *self.ready_tx.lock().unwrap() = None;
    }
}

/// A scripted remote participant that is not a full client.
///
/// It answers every incoming call with its own stream (unless silent) and
/// records every stream it receives.
pub struct RemotePeer {
    pub mesh_id: MeshId,
    pub stream: MediaStream,
    transport: Arc<FakeMeshTransport>,
    received: Arc<Mutex<Vec<(MeshId, MediaStream)>>>,
    incoming: Arc<Mutex<Vec<(LinkId, MeshId)>>>,
    task: JoinHandle<()>,
}

impl RemotePeer {
    /// Join the network as `mesh_id`, answering calls with `stream`.
    pub async fn spawn(network: &FakeMeshNetwork, mesh_id: &str, stream: MediaStream) -> Self {
        Self::start(network, mesh_id, stream, true).await
    }

    /// Join the network but never answer.
    pub async fn spawn_silent(network: &FakeMeshNetwork, mesh_id: &str) -> Self {
        let stream = crate::fixtures::voice_stream();
        Self::start(network, mesh_id, stream, false).await
    }

    async fn start(
        network: &FakeMeshNetwork,
        mesh_id: &str,
        stream: MediaStream,
        answers: bool,
    ) -> Self {
        let transport = Arc::new(network.transport(mesh_id));
        let mut events = transport.open().await.expect("remote peer open failed");
        let received = Arc::new(Mutex::new(Vec::new()));
        let incoming = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let transport = Arc::clone(&transport);
            let received = Arc::clone(&received);
            let incoming = Arc::clone(&incoming);
            let answer_with = stream.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match event {
                        TransportEvent::IncomingCall { link, from } => {
                            incoming.lock().unwrap().push((link, from));
                            if answers {
                                let _ = transport.answer(link, answer_with.clone()).await;
                            }
                        }
                        TransportEvent::RemoteStream { from, stream, .. } => {
                            received.lock().unwrap().push((from, stream));
                        }
                        _ => {}
                    }
                }
            })
        };

        Self {
            mesh_id: MeshId::from(mesh_id),
            stream,
            transport,
            received,
            incoming,
            task,
        }
    }

    /// Call `to` with our stream.
    pub async fn call(&self, to: &MeshId) -> LinkId {
        self.transport
            .call(to, self.stream.clone())
            .await
            .expect("remote peer call failed")
    }

    /// Call `to` with a different stream (e.g. a screen share).
    pub async fn call_with(&self, to: &MeshId, stream: MediaStream) -> LinkId {
        self.transport
            .call(to, stream)
            .await
            .expect("remote peer call failed")
    }

    pub fn received(&self) -> Vec<(MeshId, MediaStream)> {
        self.received.lock().unwrap().clone()
    }

    /// Calls that reached this peer, in arrival order.
    pub fn incoming_calls(&self) -> Vec<(LinkId, MeshId)> {
        self.incoming.lock().unwrap().clone()
    }

    /// Latest stream received from `from`.
    pub fn latest_from(&self, from: &MeshId) -> Option<MediaStream> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(peer, _)| peer == from)
            .map(|(_, stream)| stream.clone())
    }

    pub async fn leave(&self) {
        self.transport.shutdown().await;
    }
}

impl Drop for RemotePeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
