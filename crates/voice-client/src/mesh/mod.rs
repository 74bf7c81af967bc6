//! Peer mesh orchestration.
//!
//! # Actor Hierarchy
//!
//! ```text
//! PeerMeshActor (one per client)
//! ├── LocalMediaController   (local capture session)
//! ├── RemoteStreamRouter     (voice sinks + screen claim)
//! ├── LinkTable              (one call link per remote peer)
//! └── spawned tasks          (captures, call-setup watchdogs, share-end watchers)
//! ```
//!
//! # Session States
//!
//! `Idle → Joining → Active → Idle`. `Joining` falls back to `Idle` on a
//! capture, handshake or announce failure.

pub mod link;
pub mod manager;
pub mod messages;

pub use link::{LinkDirection, LinkTable, MeshLink};
pub use manager::{MeshDeps, PeerMeshActor, PeerMeshHandle};
pub use messages::{MeshEvent, MeshMessage, MeshState, MeshStatus};
