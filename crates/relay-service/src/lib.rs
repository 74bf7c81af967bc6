//! Huddle Signal Relay Library
//!
//! The relay is the single source of truth for voice presence. It:
//!
//! - Accepts signaling WebSocket connections (`GET /ws`)
//! - Applies `join-voice`, `toggle-mute`, `toggle-deafen` and `leave-voice`
//!   to the [`registry::RoomRegistry`] in arrival order
//! - Sends room-scoped `peer-joined` / `peer-left` notices, then a
//!   `voice-users-update` presence snapshot
//!
//! Media never passes through the relay; clients connect to each other
//! directly once they learn who is in the room.
//!
//! # Modules
//!
//! - [`actors`] - Relay actor owning the registry and connection outboxes
//! - [`registry`] - Presence data model and mutation rules
//! - [`handlers`] / [`routes`] - WebSocket endpoint
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with signaling error codes
//! - [`observability`] - Health probes and Prometheus metrics

pub mod actors;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod observability;
pub mod registry;
pub mod routes;
