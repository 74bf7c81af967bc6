//! Per-peer call links.

use crate::transport::LinkId;
use common::types::{MeshId, StreamId};
use std::collections::HashMap;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    Outbound,
    Inbound,
}

/// The current call link to one remote participant.
#[derive(Debug, Clone)]
pub struct MeshLink {
    pub link_id: LinkId,
    pub peer: MeshId,
    pub direction: LinkDirection,
    /// Last stream received on this link.
    pub inbound_stream: Option<StreamId>,
    pub established_at: Instant,
}

impl MeshLink {
    #[must_use]
    pub fn outbound(link_id: LinkId, peer: MeshId) -> Self {
        Self::new(link_id, peer, LinkDirection::Outbound)
    }

    #[must_use]
    pub fn inbound(link_id: LinkId, peer: MeshId) -> Self {
        Self::new(link_id, peer, LinkDirection::Inbound)
    }

    fn new(link_id: LinkId, peer: MeshId, direction: LinkDirection) -> Self {
        Self {
            link_id,
            peer,
            direction,
            inbound_stream: None,
            established_at: Instant::now(),
        }
    }
}

/// One link per peer. Inserting for a linked peer replaces the old link,
/// which the caller closes.
#[derive(Debug, Default)]
pub struct LinkTable {
    links: HashMap<MeshId, MeshLink>,
}

impl LinkTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    #[must_use]
    pub fn get(&self, peer: &MeshId) -> Option<&MeshLink> {
        self.links.get(peer)
    }

    #[must_use]
    pub fn contains(&self, peer: &MeshId) -> bool {
        self.links.contains_key(peer)
    }

    /// Returns the replaced link, if any.
    pub fn insert(&mut self, link: MeshLink) -> Option<MeshLink> {
        self.links.insert(link.peer.clone(), link)
    }

    pub fn remove(&mut self, peer: &MeshId) -> Option<MeshLink> {
        self.links.remove(peer)
    }

    /// Remove the link only if `link_id` is still current for its peer.
    pub fn remove_by_link(&mut self, link_id: LinkId) -> Option<MeshLink> {
        let peer = self.peer_for(link_id)?.clone();
        self.links.remove(&peer)
    }

    /// Peer whose current link is `link_id`. Replaced links resolve to `None`.
    #[must_use]
    pub fn peer_for(&self, link_id: LinkId) -> Option<&MeshId> {
        self.links
            .values()
            .find(|l| l.link_id == link_id)
            .map(|l| &l.peer)
    }

    /// Note a stream received on `link_id`; returns its peer if current.
    pub fn record_stream(&mut self, link_id: LinkId, stream_id: StreamId) -> Option<MeshId> {
        let link = self.links.values_mut().find(|l| l.link_id == link_id)?;
        link.inbound_stream = Some(stream_id);
        Some(link.peer.clone())
    }

    #[must_use]
    pub fn peers(&self) -> Vec<MeshId> {
        self.links.keys().cloned().collect()
    }

    pub fn drain(&mut self) -> Vec<MeshLink> {
        self.links.drain().map(|(_, link)| link).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_existing_peer_link() {
        let mut table = LinkTable::new();
        let peer = MeshId::from("p1");
        let first = LinkId::new();
        let second = LinkId::new();

        assert!(table.insert(MeshLink::outbound(first, peer.clone())).is_none());
        let replaced = table.insert(MeshLink::inbound(second, peer.clone())).unwrap();

        assert_eq!(replaced.link_id, first);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&peer).unwrap().direction, LinkDirection::Inbound);
    }

    #[test]
    fn test_replaced_link_no_longer_resolves() {
        let mut table = LinkTable::new();
        let peer = MeshId::from("p1");
        let old = LinkId::new();
        let new = LinkId::new();
        table.insert(MeshLink::outbound(old, peer.clone()));
        table.insert(MeshLink::outbound(new, peer.clone()));

        assert!(table.peer_for(old).is_none());
        assert!(table.record_stream(old, StreamId::new()).is_none());
        assert!(table.remove_by_link(old).is_none());
        assert_eq!(table.peer_for(new), Some(&peer));
    }

    #[test]
    fn test_record_stream_marks_link() {
        let mut table = LinkTable::new();
        let peer = MeshId::from("p2");
        let link = LinkId::new();
        table.insert(MeshLink::inbound(link, peer.clone()));
        let stream = StreamId::new();

        assert_eq!(table.record_stream(link, stream), Some(peer.clone()));
        assert_eq!(table.get(&peer).unwrap().inbound_stream, Some(stream));
    }

    #[test]
    fn test_drain_empties_table() {
        let mut table = LinkTable::new();
        table.insert(MeshLink::outbound(LinkId::new(), MeshId::from("a")));
        table.insert(MeshLink::outbound(LinkId::new(), MeshId::from("b")));

        let drained = table.drain();

        assert_eq!(drained.len(), 2);
        assert!(table.is_empty());
    }
}
