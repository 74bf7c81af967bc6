//! `RelayActor` - owns the `RoomRegistry` and every connection outbox.
//!
//! All registry mutations go through this actor's mailbox, so they are
//! applied strictly in arrival order. For each mutation the actor delivers
//! room-scoped notices first, then the presence snapshot. Those two steps are
//! not atomic with respect to events from other connections.
//!
//! Outboxes are bounded. A full or closed outbox drops that frame for that
//! connection only; the relay never waits on a slow client.

use crate::config::SnapshotScope;
use crate::errors::RelayError;
use crate::observability::metrics::{
    record_event, record_event_latency, record_frame_dropped, set_connections_active,
    set_participants_active,
};
use crate::registry::{Outcome, RoomRegistry};

use super::messages::{Outbox, RelayMessage, RelayStatus};
use super::metrics::MailboxMonitor;

use common::types::{ConnectionId, RoomId};
use signaling_protocol::{ClientEvent, ParticipantInfo, ServerEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Channel buffer size for the relay mailbox.
const RELAY_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `RelayActor`.
#[derive(Clone)]
pub struct RelayActorHandle {
    sender: mpsc::Sender<RelayMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
    relay_id: String,
}

impl RelayActorHandle {
    #[must_use]
    pub fn relay_id(&self) -> &str {
        &self.relay_id
    }

    /// Register a new connection and its outbox.
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        outbox: Outbox,
    ) -> Result<(), RelayError> {
        self.send(RelayMessage::Connect {
            connection_id,
            outbox,
        })
        .await
    }

    /// Notify the relay that a connection closed.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), RelayError> {
        self.send(RelayMessage::Disconnect { connection_id }).await
    }

    /// Forward a validated client event.
    pub async fn client_event(
        &self,
        connection_id: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), RelayError> {
        self.send(RelayMessage::Client {
            connection_id,
            event,
            received_at: Instant::now(),
        })
        .await
    }

    /// Get the current full presence snapshot.
    pub async fn get_snapshot(&self) -> Result<Vec<ParticipantInfo>, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.send(RelayMessage::GetSnapshot { respond_to: tx })
            .await?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Get relay counters.
    pub async fn get_status(&self) -> Result<RelayStatus, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.send(RelayMessage::GetStatus { respond_to: tx }).await?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the relay actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for servers and connection tasks.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    async fn send(&self, message: RelayMessage) -> Result<(), RelayError> {
        // Counted before the send so the actor's dequeue can never run first.
        self.mailbox.record_enqueue();
        if let Err(e) = self.sender.send(message).await {
            self.mailbox.record_abandoned();
            return Err(RelayError::Internal(format!("channel send failed: {e}")));
        }
        Ok(())
    }
}

/// The `RelayActor` implementation.
pub struct RelayActor {
    relay_id: String,
    receiver: mpsc::Receiver<RelayMessage>,
    cancel_token: CancellationToken,
    registry: RoomRegistry,
    /// Outboxes by connection, for every open signaling connection.
    connections: HashMap<ConnectionId, Outbox>,
    snapshot_scope: SnapshotScope,
    frames_dropped: u64,
    mailbox: Arc<MailboxMonitor>,
}

impl RelayActor {
    /// Spawn the relay actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        relay_id: String,
        snapshot_scope: SnapshotScope,
        cancel_token: CancellationToken,
    ) -> (RelayActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(RELAY_CHANNEL_BUFFER);
        let mailbox = Arc::new(MailboxMonitor::new(relay_id.clone()));

        let actor = Self {
            relay_id: relay_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            registry: RoomRegistry::new(),
            connections: HashMap::new(),
            snapshot_scope,
            frames_dropped: 0,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RelayActorHandle {
            sender,
            cancel_token,
            mailbox,
            relay_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "relay.actor", fields(relay_id = %self.relay_id))]
    async fn run(mut self) {
        info!(
            target: "relay.actor",
            relay_id = %self.relay_id,
            snapshot_scope = %self.snapshot_scope,
            "RelayActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "relay.actor",
                        relay_id = %self.relay_id,
                        "RelayActor received cancellation signal"
                    );
                    self.graceful_shutdown();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_dequeue();
                            self.handle_message(message);
                        }
                        None => {
                            info!(
                                target: "relay.actor",
                                relay_id = %self.relay_id,
                                "RelayActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "relay.actor",
            relay_id = %self.relay_id,
            participants = self.registry.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RelayActor stopped"
        );
    }

    fn handle_message(&mut self, message: RelayMessage) {
        match message {
            RelayMessage::Connect {
                connection_id,
                outbox,
            } => self.handle_connect(connection_id, outbox),

            RelayMessage::Disconnect { connection_id } => self.handle_disconnect(&connection_id),

            RelayMessage::Client {
                connection_id,
                event,
                received_at,
            } => {
                let name = event.name();
                self.handle_client_event(&connection_id, event);
                record_event(name);
                record_event_latency(name, received_at.elapsed());
            }

            RelayMessage::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.registry.snapshot());
            }

            RelayMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(RelayStatus {
                    connections: self.connections.len(),
                    participants: self.registry.len(),
                    rooms: self.registry.room_count(),
                    frames_dropped: self.frames_dropped,
                });
            }
        }
    }

    fn handle_connect(&mut self, connection_id: ConnectionId, outbox: Outbox) {
        let initial = match self.snapshot_scope {
            SnapshotScope::Global => self.registry.snapshot(),
            // Not in a room yet, so nothing is visible.
            SnapshotScope::Room => Vec::new(),
        };

        self.connections.insert(connection_id.clone(), outbox);
        set_connections_active(self.connections.len());

        debug!(
            target: "relay.actor",
            connection_id = %connection_id,
            connections = self.connections.len(),
            "Connection registered"
        );

        self.deliver(&connection_id, ServerEvent::VoiceUsersUpdate(initial));
    }

    fn handle_disconnect(&mut self, connection_id: &ConnectionId) {
        let outcome = self.registry.on_disconnect(connection_id);
        let was_in_voice = outcome.changed;

        // Outbox goes first; the closed connection must not get the snapshot.
        self.connections.remove(connection_id);
        set_connections_active(self.connections.len());
        self.apply(connection_id, outcome);

        debug!(
            target: "relay.actor",
            connection_id = %connection_id,
            was_in_voice,
            connections = self.connections.len(),
            "Connection removed"
        );
    }

    fn handle_client_event(&mut self, connection_id: &ConnectionId, event: ClientEvent) {
        let outcome = match event {
            ClientEvent::JoinVoice(join) => {
                info!(
                    target: "relay.actor",
                    connection_id = %connection_id,
                    room_id = %join.room_id,
                    mesh_id = %join.mesh_id,
                    "Participant joining voice"
                );
                self.registry.join_voice(
                    connection_id.clone(),
                    join.room_id,
                    join.mesh_id,
                    join.display_name,
                )
            }
            ClientEvent::ToggleMute(toggle) => {
                self.registry.toggle_mute(connection_id, toggle.is_muted)
            }
            ClientEvent::ToggleDeafen(toggle) => {
                self.registry.toggle_deafen(connection_id, toggle.is_deafened)
            }
            ClientEvent::LeaveVoice(_) => {
                let outcome = self.registry.leave_voice(connection_id);
                if outcome.changed {
                    info!(
                        target: "relay.actor",
                        connection_id = %connection_id,
                        "Participant left voice"
                    );
                }
                outcome
            }
        };

        if !outcome.changed {
            debug!(
                target: "relay.actor",
                connection_id = %connection_id,
                "Event ignored, connection not in voice"
            );
        }

        self.apply(connection_id, outcome);
    }

    /// Deliver notices, then the snapshot.
    fn apply(&mut self, actor: &ConnectionId, outcome: Outcome) {
        for notice in outcome.notices {
            for recipient in &notice.recipients {
                self.deliver(recipient, notice.event.clone());
            }
        }

        if !outcome.changed {
            return;
        }

        set_participants_active(self.registry.len());

        match self.snapshot_scope {
            SnapshotScope::Global => {
                let snapshot = self.registry.snapshot();
                let recipients: Vec<ConnectionId> = self.connections.keys().cloned().collect();
                for recipient in &recipients {
                    self.deliver(recipient, ServerEvent::VoiceUsersUpdate(snapshot.clone()));
                }
            }
            SnapshotScope::Room => {
                for room_id in &outcome.rooms {
                    self.broadcast_room_snapshot(room_id, actor);
                }
            }
        }
    }

    fn broadcast_room_snapshot(&mut self, room_id: &RoomId, actor: &ConnectionId) {
        let snapshot = self.registry.room_snapshot(room_id);
        let mut recipients = self.registry.members(room_id);
        if !recipients.contains(actor) {
            recipients.push(actor.clone());
        }
        for recipient in &recipients {
            self.deliver(recipient, ServerEvent::VoiceUsersUpdate(snapshot.clone()));
        }
    }

    /// Queue one event for one connection without waiting.
    fn deliver(&mut self, connection_id: &ConnectionId, event: ServerEvent) {
        let Some(outbox) = self.connections.get(connection_id) else {
            return;
        };

        match outbox.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.frames_dropped += 1;
                record_frame_dropped();
                warn!(
                    target: "relay.actor",
                    connection_id = %connection_id,
                    event = event.name(),
                    "Outbound queue full, frame dropped"
                );
            }
            Err(TrySendError::Closed(_)) => {
                // Writer already gone; the disconnect message is on its way.
                debug!(
                    target: "relay.actor",
                    connection_id = %connection_id,
                    "Outbound queue closed"
                );
            }
        }
    }

    /// Drop every outbox so connection writers drain and close.
    fn graceful_shutdown(&mut self) {
        info!(
            target: "relay.actor",
            relay_id = %self.relay_id,
            participants = self.registry.len(),
            connections = self.connections.len(),
            "Performing graceful shutdown"
        );

        self.connections.clear();
        set_connections_active(0);

        info!(
            target: "relay.actor",
            relay_id = %self.relay_id,
            "Graceful shutdown complete"
        );
    }
}
