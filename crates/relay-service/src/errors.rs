//! Relay error types.
//!
//! Errors map to signaling error codes sent back to clients in an `error`
//! event. Internal details are logged server-side but never sent.

use signaling_protocol::{error_codes, ErrorPayload, ProtocolError};
use thiserror::Error;

/// Relay error type.
///
/// Maps to signaling error codes:
/// - `InvalidRequest`: `INVALID_REQUEST` (1)
/// - `PayloadTooLarge`: `PAYLOAD_TOO_LARGE` (8)
/// - Internal, Config: `INTERNAL_ERROR` (6)
#[derive(Debug, Error)]
pub enum RelayError {
    /// Client frame was malformed or failed validation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Client frame exceeded the size limit.
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (actor mailbox closed, response dropped).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the signaling error code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            RelayError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            RelayError::PayloadTooLarge { .. } => error_codes::PAYLOAD_TOO_LARGE,
            RelayError::Config(_) | RelayError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RelayError::InvalidRequest(reason) => format!("Invalid request: {reason}"),
            RelayError::PayloadTooLarge { max, .. } => {
                format!("Frame exceeds the {max} byte limit")
            }
            RelayError::Config(_) | RelayError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// Bounded label for the rejected-events counter.
    #[must_use]
    pub const fn reason_label(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) => "invalid_request",
            RelayError::PayloadTooLarge { .. } => "payload_too_large",
            RelayError::Config(_) | RelayError::Internal(_) => "internal",
        }
    }

    /// Build the `error` event payload for this error.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.error_code(),
            message: self.client_message(),
        }
    }
}

impl From<ProtocolError> for RelayError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::FrameTooLarge { size, max } => RelayError::PayloadTooLarge { size, max },
            // Serde messages echo input fragments; keep them out of client replies.
            ProtocolError::Malformed(_) => {
                RelayError::InvalidRequest("unrecognized event".to_string())
            }
            ProtocolError::InvalidField { field, reason } => {
                RelayError::InvalidRequest(format!("{field} {reason}"))
            }
            ProtocolError::Encode(detail) => RelayError::Internal(detail),
        }
    }
}
