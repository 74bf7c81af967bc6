//! Voice client error types.
//!
//! Seam errors (`MediaError`, `TransportError`, `SignalError`) come from the
//! injected collaborators. `ClientError` is what the mesh handle returns to
//! the host application.

use thiserror::Error;

/// Failure reported by a [`crate::media::MediaDevices`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The user or platform refused access to the device.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No usable capture device.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The user dismissed the display picker.
    #[error("display capture cancelled")]
    Cancelled,
}

/// Failure reported by a [`crate::transport::MeshTransport`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The identity broker handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Placing or answering a call failed.
    #[error("call failed: {0}")]
    Call(String),

    /// The transport has been shut down.
    #[error("transport closed")]
    Closed,
}

/// Failure on the signaling channel to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("signal channel closed")]
    Closed,
}

/// Errors returned by the voice client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("mesh handshake failed: {0}")]
    Handshake(String),

    #[error("screen share cancelled")]
    ShareCancelled,

    /// A stream replacement failed; the session may be voice-silent.
    #[error("stream replacement failed: {0}")]
    ReplaceFailed(String),

    /// The operation is not allowed in the current session state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("signaling error: {0}")]
    Signal(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Short label for logs and host UI routing.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::PermissionDenied(_) => "permission_denied",
            ClientError::DeviceUnavailable(_) => "device_unavailable",
            ClientError::Handshake(_) => "handshake",
            ClientError::ShareCancelled => "share_cancelled",
            ClientError::ReplaceFailed(_) => "replace_failed",
            ClientError::InvalidState(_) => "invalid_state",
            ClientError::Signal(_) => "signal",
            ClientError::Transport(_) => "transport",
            ClientError::Internal(_) => "internal",
        }
    }

    /// Map a media failure that happened while replacing a live stream.
    #[must_use]
    pub fn from_replacement(err: MediaError) -> Self {
        match err {
            MediaError::Cancelled => ClientError::ShareCancelled,
            other => ClientError::ReplaceFailed(other.to_string()),
        }
    }
}

impl From<MediaError> for ClientError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::PermissionDenied(reason) => ClientError::PermissionDenied(reason),
            MediaError::DeviceUnavailable(reason) => ClientError::DeviceUnavailable(reason),
            MediaError::Cancelled => ClientError::ShareCancelled,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Handshake(reason) => ClientError::Handshake(reason),
            other => ClientError::Transport(other.to_string()),
        }
    }
}

impl From<SignalError> for ClientError {
    fn from(err: SignalError) -> Self {
        ClientError::Signal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_errors_map_to_client_errors() {
        assert_eq!(
            ClientError::from(MediaError::PermissionDenied("blocked".to_string())),
            ClientError::PermissionDenied("blocked".to_string())
        );
        assert_eq!(
            ClientError::from(MediaError::DeviceUnavailable("no mic".to_string())),
            ClientError::DeviceUnavailable("no mic".to_string())
        );
        assert_eq!(
            ClientError::from(MediaError::Cancelled),
            ClientError::ShareCancelled
        );
    }

    #[test]
    fn test_replacement_failures_are_replace_failed() {
        let err = ClientError::from_replacement(MediaError::DeviceUnavailable("gone".to_string()));
        assert_eq!(err.kind(), "replace_failed");
        assert!(err.to_string().contains("gone"));

        assert_eq!(
            ClientError::from_replacement(MediaError::Cancelled),
            ClientError::ShareCancelled
        );
    }

    #[test]
    fn test_transport_handshake_maps_to_handshake() {
        let err = ClientError::from(TransportError::Handshake("broker down".to_string()));
        assert_eq!(err, ClientError::Handshake("broker down".to_string()));

        let err = ClientError::from(TransportError::Closed);
        assert_eq!(err.kind(), "transport");
    }

    #[test]
    fn test_signal_error_display() {
        let err = ClientError::from(SignalError::Closed);
        assert_eq!(err.to_string(), "signaling error: signal channel closed");
    }
}
