//! WebSocket signaling endpoint.
//!
//! Each connection gets a fresh `ConnectionId`, a bounded outbox drained by a
//! writer task, and a reader loop that decodes frames and forwards them to
//! the relay actor. Rejected frames are answered on the same connection with
//! an `error` event; the registry is never touched.

use crate::errors::RelayError;
use crate::observability::metrics::record_event_rejected;
use crate::routes::AppState;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use common::types::ConnectionId;
use futures::{SinkExt, StreamExt};
use signaling_protocol::{decode_client_event, encode_server_event, ServerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// How long the writer may take to flush after the reader exits.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// `GET /ws` - upgrade to a signaling WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[instrument(skip_all, name = "relay.ws", fields(connection_id = tracing::field::Empty))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = ConnectionId::generate();
    tracing::Span::current().record("connection_id", connection_id.as_str());

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbox, mut outbox_rx) = mpsc::channel::<ServerEvent>(state.config.outbound_buffer);

    if let Err(e) = state
        .relay
        .connect(connection_id.clone(), outbox.clone())
        .await
    {
        warn!(target: "relay.ws", error = %e, "Relay unavailable, closing connection");
        let _ = ws_tx.close().await;
        return;
    }

    info!(target: "relay.ws", connection_id = %connection_id, "Connection opened");

    let writer = tokio::spawn(async move {
        while let Some(event) = outbox_rx.recv().await {
            let frame = match encode_server_event(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(target: "relay.ws", error = %e, "Failed to encode server event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let cancel = state.relay.child_token();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, &connection_id, &text, &outbox).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        reject(
                            &outbox,
                            &RelayError::InvalidRequest("binary frames are not supported".to_string()),
                        );
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong are answered by the WebSocket layer.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(target: "relay.ws", error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = state.relay.disconnect(connection_id.clone()).await {
        debug!(target: "relay.ws", error = %e, "Disconnect not delivered, relay stopped");
    }

    // The relay drops its outbox clone on disconnect; dropping ours lets
    // the writer flush what is queued and close the socket.
    drop(outbox);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer)
        .await
        .is_err()
    {
        debug!(target: "relay.ws", "Writer did not drain in time");
    }

    info!(target: "relay.ws", connection_id = %connection_id, "Connection closed");
}

async fn handle_frame(
    state: &AppState,
    connection_id: &ConnectionId,
    text: &str,
    outbox: &mpsc::Sender<ServerEvent>,
) {
    let event = match decode_client_event(text, state.config.max_frame_bytes) {
        Ok(event) => event,
        Err(e) => {
            let err = RelayError::from(e);
            debug!(
                target: "relay.ws",
                connection_id = %connection_id,
                error = %err,
                "Client frame rejected"
            );
            reject(outbox, &err);
            return;
        }
    };

    if let Err(e) = state.relay.client_event(connection_id.clone(), event).await {
        warn!(target: "relay.ws", error = %e, "Failed to forward client event");
        reject(outbox, &e);
    }
}

/// Reply with an `error` event without waiting on a full queue.
fn reject(outbox: &mpsc::Sender<ServerEvent>, err: &RelayError) {
    record_event_rejected(err.reason_label());
    let _ = outbox.try_send(ServerEvent::Error(err.to_payload()));
}
