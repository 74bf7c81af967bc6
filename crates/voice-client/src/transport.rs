//! Direct peer-to-peer media transport seam.
//!
//! The transport owns the identity broker handshake and the individual call
//! links. Every call and every answer carries exactly one stream; the far
//! side's stream comes back as [`TransportEvent::RemoteStream`].

use crate::errors::TransportError;
use crate::media::MediaStream;
use async_trait::async_trait;
use common::types::MeshId;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier of one call link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub Uuid);

impl LinkId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Events delivered on the channel returned by [`MeshTransport::open`].
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Handshake complete; this is our mesh identity for the session.
    Ready { mesh_id: MeshId },

    /// Handshake could not complete.
    HandshakeFailed { reason: String },

    /// A remote participant is calling us.
    IncomingCall { link: LinkId, from: MeshId },

    /// The far side's stream arrived on a link.
    RemoteStream {
        link: LinkId,
        from: MeshId,
        stream: MediaStream,
    },

    /// The link was closed by the far side or the network.
    LinkClosed { link: LinkId },
}

/// Peer mesh transport, supplied by the host platform.
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Start the identity handshake. `Ready` or `HandshakeFailed` follows
    /// on the returned channel.
    ///
    /// Must return as soon as the handshake is started, without waiting for
    /// the broker: the mesh actor awaits it inline, so a slow `open` delays
    /// every request queued behind the join, `leave_room` included.
    ///
    /// # Errors
    ///
    /// `Handshake` if the handshake cannot even be started.
    async fn open(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    /// Call `peer`, offering `stream`.
    ///
    /// # Errors
    ///
    /// `Call` or `Closed`.
    async fn call(&self, peer: &MeshId, stream: MediaStream) -> Result<LinkId, TransportError>;

    /// Answer an incoming call with `stream`.
    ///
    /// # Errors
    ///
    /// `Call` or `Closed`.
    async fn answer(&self, link: LinkId, stream: MediaStream) -> Result<(), TransportError>;

    /// Close (or reject) a link. Closing an unknown link is a no-op.
    async fn close_link(&self, link: LinkId);

    /// Close every link and release the mesh identity.
    async fn shutdown(&self);
}
