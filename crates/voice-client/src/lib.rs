//! Huddle Voice Client Library
//!
//! Client-side half of Huddle voice rooms:
//!
//! - [`local_media`] - the single local capture session and its replacements
//! - [`mesh`] - the peer mesh actor: join/leave, call placement and
//!   answering, re-calls after stream replacement, local controls
//! - [`router`] - inbound stream classification (voice vs. screen) and
//!   playback routing
//! - [`signal`] - the relay connection (`WsSignalChannel`)
//!
//! Capture devices, the peer transport and playback are host-supplied
//! through the [`media::MediaDevices`], [`transport::MeshTransport`] and
//! [`router::PlaybackSurface`] traits.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ClientConfig::from_env()?;
//! let token = CancellationToken::new();
//! let (signal, server_events) = WsSignalChannel::connect(&config.relay_url, token.child_token()).await?;
//! let deps = MeshDeps { devices, transport, signal: Arc::new(signal), surface };
//! let (mesh, _task) = PeerMeshActor::spawn(config.mesh_settings(), deps, server_events, token);
//! let mesh_id = mesh.join_room(RoomId::from("voice-lounge")).await?;
//! ```

pub mod config;
pub mod errors;
pub mod local_media;
pub mod media;
pub mod mesh;
pub mod router;
pub mod signal;
pub mod transport;

pub use config::{ClientConfig, LinkPolicy, MeshSettings};
pub use errors::{ClientError, MediaError, SignalError, TransportError};
pub use mesh::{MeshDeps, MeshEvent, MeshState, MeshStatus, PeerMeshActor, PeerMeshHandle};
