//! HTTP routes for the signal relay.
//!
//! Defines the Axum router and application state for the signaling
//! listener. Health and metrics live on their own listener
//! (see [`crate::observability::health_router`]).

use crate::actors::RelayActorHandle;
use crate::config::Config;
use crate::handlers;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the relay actor.
    pub relay: RelayActorHandle,

    /// Service configuration.
    pub config: Config,
}

/// Build the signaling routes.
///
/// - `/ws` - WebSocket upgrade for voice signaling
/// - TraceLayer for request logging
pub fn build_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(handlers::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
