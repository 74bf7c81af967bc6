//! HTTP handlers for the signal relay.

pub mod ws;

pub use ws::ws_handler;
