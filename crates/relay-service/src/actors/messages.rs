//! Message types for the relay actor.
//!
//! Request/response messages carry a `respond_to` oneshot; notifications
//! are fire-and-forget.

use common::types::ConnectionId;
use signaling_protocol::{ClientEvent, ParticipantInfo, ServerEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Sending half of a connection's outbound queue.
pub type Outbox = mpsc::Sender<ServerEvent>;

/// Messages handled by the `RelayActor`.
#[derive(Debug)]
pub enum RelayMessage {
    /// A signaling connection opened. The relay sends it the current
    /// snapshot immediately.
    Connect {
        connection_id: ConnectionId,
        outbox: Outbox,
    },

    /// A signaling connection closed. Treated as an implicit leave.
    Disconnect { connection_id: ConnectionId },

    /// A decoded and validated client event.
    Client {
        connection_id: ConnectionId,
        event: ClientEvent,
        received_at: Instant,
    },

    /// Read the current full snapshot.
    GetSnapshot {
        respond_to: oneshot::Sender<Vec<ParticipantInfo>>,
    },

    /// Read relay counters.
    GetStatus {
        respond_to: oneshot::Sender<RelayStatus>,
    },
}

/// Point-in-time relay counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStatus {
    pub connections: usize,
    pub participants: usize,
    pub rooms: usize,
    pub frames_dropped: u64,
}
