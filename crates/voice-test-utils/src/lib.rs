//! # Voice Test Utilities
//!
//! Shared test utilities for the signal relay and the voice client.
//!
//! ## Modules
//!
//! - `fake_media` - Scripted capture devices (`FakeMediaDevices`)
//! - `fake_mesh` - In-process peer network (`FakeMeshNetwork`,
//!   `FakeMeshTransport`, `RemotePeer`)
//! - `fake_signal` - Recording signal channel
//! - `fake_surface` - Recording playback surface
//! - `fixtures` - Participants, snapshots and streams
//! - `mesh_harness` - One voice client with a scripted relay (`TestMesh`)
//! - `relay_harness` - Real relay on an ephemeral port (`TestRelayServer`),
//!   a raw WebSocket client and a full voice client wired to fakes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use voice_test_utils::*;
//!
//! #[tokio::test]
//! async fn two_clients_link_up() {
//!     let server = TestRelayServer::spawn().await.unwrap();
//!     let network = FakeMeshNetwork::new();
//!     let x = TestVoiceClient::connect(&server, &network, "p1", "X").await.unwrap();
//!     let y = TestVoiceClient::connect(&server, &network, "p2", "Y").await.unwrap();
//!
//!     x.handle.join_room(fixtures::voice_lounge()).await.unwrap();
//!     y.handle.join_room(fixtures::voice_lounge()).await.unwrap();
//! }
//! ```

pub mod fake_media;
pub mod fake_mesh;
pub mod fake_signal;
pub mod fake_surface;
pub mod fixtures;
pub mod mesh_harness;
pub mod relay_harness;

pub use fake_media::{FakeMediaDevices, MediaGate};
pub use fake_mesh::{CallRecord, FakeMeshNetwork, FakeMeshTransport, HandshakeMode, RemotePeer};
pub use fake_signal::RecordingSignalChannel;
pub use fake_surface::{RecordingSurface, SurfaceCall};
pub use mesh_harness::TestMesh;
pub use relay_harness::{eventually, next_event, TestRelayServer, TestVoiceClient, TestWsClient};
