//! Signaling protocol for Huddle voice rooms.
//!
//! Every signaling message is one JSON object carried in a single
//! WebSocket text frame:
//!
//! ```text
//! {"event": "join-voice", "data": {"roomId": "voice-lounge", "meshId": "p1", "displayName": "X"}}
//! ```
//!
//! The event sets are closed enums ([`ClientEvent`], [`ServerEvent`]); anything
//! that does not match a variant is rejected at decode time.

#![warn(clippy::pedantic)]

pub mod codec;
pub mod events;

pub use codec::{
    decode_client_event, decode_server_event, encode_client_event, encode_server_event,
    ProtocolError,
};
pub use events::{
    error_codes, ClientEvent, ErrorPayload, JoinVoice, LeaveVoice, ParticipantInfo, ServerEvent,
    ToggleDeafen, ToggleMute,
};
