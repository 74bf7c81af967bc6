//! `RoomRegistry` - authoritative voice presence for the relay.
//!
//! Maps each signaling connection to at most one participant. The registry
//! is plain data: every mutation returns an [`Outcome`] describing the
//! room-scoped notices to deliver and whether a presence snapshot is due.
//! Delivery is the relay actor's job.
//!
//! Participants are kept in join order; a re-join moves the entry to the end.

use common::types::{ConnectionId, MeshId, RoomId};
use signaling_protocol::{ParticipantInfo, ServerEvent};
use std::collections::HashSet;

/// Participant state owned by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Participant {
    mesh_id: MeshId,
    connection_id: ConnectionId,
    display_name: String,
    room_id: RoomId,
    is_muted: bool,
    is_deafened: bool,
}

impl Participant {
    fn to_info(&self) -> ParticipantInfo {
        ParticipantInfo {
            mesh_id: self.mesh_id.clone(),
            connection_id: self.connection_id.clone(),
            display_name: self.display_name.clone(),
            room_id: self.room_id.clone(),
            is_muted: self.is_muted,
            is_deafened: self.is_deafened,
        }
    }
}

/// A room-scoped event and the connections it goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub recipients: Vec<ConnectionId>,
    pub event: ServerEvent,
}

/// Result of a registry mutation.
///
/// Notices are delivered before the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub notices: Vec<Notice>,
    /// Participant state changed; a snapshot must follow.
    pub changed: bool,
    /// Rooms whose membership or flags changed, in first-touched order.
    pub rooms: Vec<RoomId>,
}

impl Outcome {
    fn touch(&mut self, room_id: &RoomId) {
        self.changed = true;
        if !self.rooms.contains(room_id) {
            self.rooms.push(room_id.clone());
        }
    }
}

/// Process-lifetime presence registry.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    participants: Vec<Participant>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of participants across all rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Number of rooms with at least one participant.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.participants
            .iter()
            .map(|p| &p.room_id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Participant registered for a connection, if any.
    #[must_use]
    pub fn get(&self, connection_id: &ConnectionId) -> Option<ParticipantInfo> {
        self.find(connection_id).map(Participant::to_info)
    }

    /// Every participant across all rooms, in join order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ParticipantInfo> {
        self.participants.iter().map(Participant::to_info).collect()
    }

    /// Participants of one room, in join order.
    #[must_use]
    pub fn room_snapshot(&self, room_id: &RoomId) -> Vec<ParticipantInfo> {
        self.participants
            .iter()
            .filter(|p| &p.room_id == room_id)
            .map(Participant::to_info)
            .collect()
    }

    /// Connections currently in a room.
    #[must_use]
    pub fn members(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.participants
            .iter()
            .filter(|p| &p.room_id == room_id)
            .map(|p| p.connection_id.clone())
            .collect()
    }

    /// Register a connection as a participant of `room_id`.
    ///
    /// Any prior participant for the same connection is replaced. If the
    /// replacement moves the connection to another room or mesh identity,
    /// the old room is told the old identity left.
    pub fn join_voice(
        &mut self,
        connection_id: ConnectionId,
        room_id: RoomId,
        mesh_id: MeshId,
        display_name: String,
    ) -> Outcome {
        let mut outcome = Outcome::default();

        if let Some(prior) = self.remove(&connection_id) {
            if prior.room_id != room_id || prior.mesh_id != mesh_id {
                self.notify_room(&mut outcome, &prior.room_id, ServerEvent::PeerLeft(prior.mesh_id));
            }
            outcome.touch(&prior.room_id);
        }

        self.notify_room(&mut outcome, &room_id, ServerEvent::PeerJoined(mesh_id.clone()));
        outcome.touch(&room_id);

        self.participants.push(Participant {
            mesh_id,
            connection_id,
            display_name,
            room_id,
            is_muted: false,
            is_deafened: false,
        });

        outcome
    }

    /// Set the mute flag. Ignored for connections not in voice.
    pub fn toggle_mute(&mut self, connection_id: &ConnectionId, is_muted: bool) -> Outcome {
        let mut outcome = Outcome::default();
        if let Some(participant) = self.find_mut(connection_id) {
            participant.is_muted = is_muted;
            let room_id = participant.room_id.clone();
            outcome.touch(&room_id);
        }
        outcome
    }

    /// Set the deafen flag. Deafening also mutes; un-deafening leaves the
    /// mute flag alone. Ignored for connections not in voice.
    pub fn toggle_deafen(&mut self, connection_id: &ConnectionId, is_deafened: bool) -> Outcome {
        let mut outcome = Outcome::default();
        if let Some(participant) = self.find_mut(connection_id) {
            participant.is_deafened = is_deafened;
            if is_deafened {
                participant.is_muted = true;
            }
            let room_id = participant.room_id.clone();
            outcome.touch(&room_id);
        }
        outcome
    }

    /// Explicit leave. Idempotent.
    pub fn leave_voice(&mut self, connection_id: &ConnectionId) -> Outcome {
        let mut outcome = Outcome::default();
        if let Some(prior) = self.remove(connection_id) {
            self.notify_room(&mut outcome, &prior.room_id, ServerEvent::PeerLeft(prior.mesh_id));
            outcome.touch(&prior.room_id);
        }
        outcome
    }

    /// Connection closed. Same effect as [`RoomRegistry::leave_voice`].
    pub fn on_disconnect(&mut self, connection_id: &ConnectionId) -> Outcome {
        self.leave_voice(connection_id)
    }

    fn find(&self, connection_id: &ConnectionId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| &p.connection_id == connection_id)
    }

    fn find_mut(&mut self, connection_id: &ConnectionId) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| &p.connection_id == connection_id)
    }

    fn remove(&mut self, connection_id: &ConnectionId) -> Option<Participant> {
        let index = self
            .participants
            .iter()
            .position(|p| &p.connection_id == connection_id)?;
        Some(self.participants.remove(index))
    }

    /// Queue a notice to the current members of a room, skipping empty rooms.
    fn notify_room(&self, outcome: &mut Outcome, room_id: &RoomId, event: ServerEvent) {
        let recipients = self.members(room_id);
        if !recipients.is_empty() {
            outcome.notices.push(Notice { recipients, event });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::from(id)
    }

    fn join(registry: &mut RoomRegistry, c: &str, room: &str, mesh: &str) -> Outcome {
        registry.join_voice(conn(c), RoomId::from(room), MeshId::from(mesh), format!("user-{c}"))
    }

    #[test]
    fn test_first_join_has_no_notice_but_changes_state() {
        let mut registry = RoomRegistry::new();
        let outcome = join(&mut registry, "c1", "voice-lounge", "p1");

        assert!(outcome.notices.is_empty());
        assert!(outcome.changed);
        assert_eq!(outcome.rooms, vec![RoomId::from("voice-lounge")]);
        assert_eq!(registry.len(), 1);

        let info = registry.get(&conn("c1")).unwrap();
        assert!(!info.is_muted);
        assert!(!info.is_deafened);
    }

    #[test]
    fn test_second_join_notifies_existing_members_only() {
        let mut registry = RoomRegistry::new();
        join(&mut registry, "c1", "voice-lounge", "p1");
        join(&mut registry, "c3", "other-room", "p3");
        let outcome = join(&mut registry, "c2", "voice-lounge", "p2");

        assert_eq!(
            outcome.notices,
            vec![Notice {
                recipients: vec![conn("c1")],
                event: ServerEvent::PeerJoined(MeshId::from("p2")),
            }]
        );

        let lounge = registry.room_snapshot(&RoomId::from("voice-lounge"));
        assert_eq!(lounge.len(), 2);
        assert_eq!(lounge[0].mesh_id, MeshId::from("p1"));
        assert_eq!(lounge[1].mesh_id, MeshId::from("p2"));
        assert_eq!(registry.snapshot().len(), 3);
        assert_eq!(registry.room_count(), 2);
    }

    #[test]
    fn test_distinct_connections_get_one_participant_each() {
        let mut registry = RoomRegistry::new();
        for i in 0..5 {
            join(&mut registry, &format!("c{i}"), "r", &format!("p{i}"));
        }
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_rejoin_replaces_prior_participant() {
        let mut registry = RoomRegistry::new();
        join(&mut registry, "c1", "r", "p1");
        registry.toggle_deafen(&conn("c1"), true);

        join(&mut registry, "c1", "r", "p1");

        assert_eq!(registry.len(), 1);
        let info = registry.get(&conn("c1")).unwrap();
        assert!(!info.is_muted, "re-join resets flags");
        assert!(!info.is_deafened);
    }

    #[test]
    fn test_rejoin_moves_entry_to_end_of_join_order() {
        let mut registry = RoomRegistry::new();
        join(&mut registry, "c1", "r", "p1");
        join(&mut registry, "c2", "r", "p2");
        join(&mut registry, "c1", "r", "p1b");

        let order: Vec<_> = registry.snapshot().into_iter().map(|p| p.mesh_id).collect();
        assert_eq!(order, vec![MeshId::from("p2"), MeshId::from("p1b")]);
    }

    #[test]
    fn test_rejoin_to_other_room_tells_old_room() {
        let mut registry = RoomRegistry::new();
        join(&mut registry, "c1", "a", "p1");
        join(&mut registry, "c2", "a", "p2");
        join(&mut registry, "c3", "b", "p3");

        let outcome = join(&mut registry, "c2", "b", "p2");

        assert_eq!(
            outcome.notices,
            vec![
                Notice {
                    recipients: vec![conn("c1")],
                    event: ServerEvent::PeerLeft(MeshId::from("p2")),
                },
                Notice {
                    recipients: vec![conn("c3")],
                    event: ServerEvent::PeerJoined(MeshId::from("p2")),
                },
            ]
        );
        assert_eq!(outcome.rooms, vec![RoomId::from("a"), RoomId::from("b")]);
    }

    #[test]
    fn test_rejoin_same_identity_does_not_announce_leave() {
        let mut registry = RoomRegistry::new();
        join(&mut registry, "c1", "a", "p1");
        join(&mut registry, "c2", "a", "p2");

        let outcome = join(&mut registry, "c2", "a", "p2");
        assert!(outcome
            .notices
            .iter()
            .all(|n| !matches!(n.event, ServerEvent::PeerLeft(_))));
    }

    #[test]
    fn test_deafen_forces_mute() {
        let mut registry = RoomRegistry::new();
        join(&mut registry, "c1", "r", "p1");

        let outcome = registry.toggle_deafen(&conn("c1"), true);
        assert!(outcome.changed);

        let info = registry.get(&conn("c1")).unwrap();
        assert!(info.is_deafened);
        assert!(info.is_muted);
    }

    #[test]
    fn test_undeafen_never_changes_mute() {
        let mut registry = RoomRegistry::new();
        join(&mut registry, "c1", "r", "p1");

        registry.toggle_deafen(&conn("c1"), true);
        registry.toggle_deafen(&conn("c1"), false);
        let info = registry.get(&conn("c1")).unwrap();
        assert!(!info.is_deafened);
        assert!(info.is_muted, "still muted after un-deafen");

        registry.toggle_mute(&conn("c1"), false);
        registry.toggle_deafen(&conn("c1"), false);
        assert!(!registry.get(&conn("c1")).unwrap().is_muted);
    }

    #[test]
    fn test_toggles_for_unknown_connection_are_ignored() {
        let mut registry = RoomRegistry::new();
        assert_eq!(registry.toggle_mute(&conn("ghost"), true), Outcome::default());
        assert_eq!(registry.toggle_deafen(&conn("ghost"), true), Outcome::default());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_leave_notifies_each_remaining_member_once() {
        let mut registry = RoomRegistry::new();
        join(&mut registry, "c1", "r", "p1");
        join(&mut registry, "c2", "r", "p2");
        join(&mut registry, "c3", "r", "p3");
        join(&mut registry, "c4", "elsewhere", "p4");

        let outcome = registry.leave_voice(&conn("c2"));

        assert_eq!(outcome.notices.len(), 1);
        assert_eq!(outcome.notices[0].recipients, vec![conn("c1"), conn("c3")]);
        assert_eq!(
            outcome.notices[0].event,
            ServerEvent::PeerLeft(MeshId::from("p2"))
        );
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_leave_is_idempotent() {
        let mut registry = RoomRegistry::new();
        join(&mut registry, "c1", "r", "p1");
        join(&mut registry, "c2", "r", "p2");

        assert!(registry.on_disconnect(&conn("c2")).changed);
        assert_eq!(registry.on_disconnect(&conn("c2")), Outcome::default());
        assert_eq!(registry.leave_voice(&conn("c2")), Outcome::default());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_last_member_leaving_has_no_recipients() {
        let mut registry = RoomRegistry::new();
        join(&mut registry, "c1", "r", "p1");

        let outcome = registry.leave_voice(&conn("c1"));
        assert!(outcome.notices.is_empty());
        assert!(outcome.changed);
        assert_eq!(registry.room_count(), 0);
    }
}
