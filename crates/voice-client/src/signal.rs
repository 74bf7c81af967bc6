//! Signaling channel to the relay.

use crate::errors::SignalError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use signaling_protocol::{decode_server_event, encode_client_event, ClientEvent, ServerEvent};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Frames queued for the socket writer.
const OUTBOUND_BUFFER: usize = 64;

/// Server events queued for the mesh actor.
const INBOUND_BUFFER: usize = 256;

/// Outbound half of the relay connection.
#[async_trait]
pub trait SignalChannel: Send + Sync {
    /// Send one client event to the relay.
    ///
    /// # Errors
    ///
    /// `Encode` or `Closed`.
    async fn emit(&self, event: ClientEvent) -> Result<(), SignalError>;
}

/// WebSocket connection to the relay's `/ws` endpoint.
///
/// A writer task drains queued frames into the socket; a reader task decodes
/// server frames onto the receiver returned by [`WsSignalChannel::connect`].
/// Cancelling the token (or [`WsSignalChannel::close`]) stops both.
pub struct WsSignalChannel {
    outbound: mpsc::Sender<String>,
    cancel_token: CancellationToken,
}

impl WsSignalChannel {
    /// Connect to `url` and start the reader and writer tasks.
    ///
    /// # Errors
    ///
    /// `Connect` if the WebSocket handshake fails.
    pub async fn connect(
        url: &str,
        cancel_token: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<ServerEvent>), SignalError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| SignalError::Connect(e.to_string()))?;
        info!(target: "client.signal", url, "Connected to relay");

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel::<ServerEvent>(INBOUND_BUFFER);

        let writer_token = cancel_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = writer_token.cancelled() => break,

                    frame = outbound_rx.recv() => {
                        let Some(text) = frame else { break };
                        if let Err(e) = ws_write.send(Message::Text(text)).await {
                            debug!(target: "client.signal", error = %e, "WebSocket write failed");
                            break;
                        }
                    }
                }
            }
            let _ = ws_write.close().await;
        });

        let reader_token = cancel_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = reader_token.cancelled() => break,

                    msg = ws_read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => match decode_server_event(&text) {
                                Ok(event) => {
                                    if inbound_tx.send(event).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    warn!(target: "client.signal", error = %e, "Dropping undecodable relay frame");
                                }
                            },
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                debug!(target: "client.signal", error = %e, "WebSocket read failed");
                                break;
                            }
                        }
                    }
                }
            }
            info!(target: "client.signal", "Relay connection closed");
        });

        Ok((
            Self {
                outbound,
                cancel_token,
            },
            inbound_rx,
        ))
    }

    /// Stop the reader and writer tasks.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }
}

#[async_trait]
impl SignalChannel for WsSignalChannel {
    async fn emit(&self, event: ClientEvent) -> Result<(), SignalError> {
        let frame = encode_client_event(&event).map_err(|e| SignalError::Encode(e.to_string()))?;
        debug!(target: "client.signal", event = event.name(), "Emitting client event");
        self.outbound
            .send(frame)
            .await
            .map_err(|_| SignalError::Closed)
    }
}
