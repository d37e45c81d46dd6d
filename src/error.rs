//! Error types for voice sessions.
//!
//! Attempt-fatal failures (configuration, credential fetch, microphone
//! permission, transport open) are `SessionError`s and force the session back
//! to `idle`. Per-frame and per-message failures use the narrower types below
//! and are only ever logged.

use crate::protocol::close::CloseCategory;
use thiserror::Error;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that end a session attempt.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Missing agent id, missing credential, or invalid settings.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The credential provider answered with a non-success response.
    #[error("Credential error: {message}")]
    Credential {
        /// HTTP status from the provider, when there was one.
        status: Option<u16>,
        /// Provider-supplied detail or a generic message.
        message: String,
    },

    /// Microphone access was denied or the capture device is unavailable.
    #[error("Microphone unavailable: {0}")]
    Permission(#[from] CaptureError),

    /// The transport failed to open.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The transport closed abnormally.
    #[error("{}", .0.message())]
    Closed(CloseCategory),

    /// Operation not valid in the current connection state.
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

impl SessionError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn credential<S: Into<String>>(status: Option<u16>, msg: S) -> Self {
        Self::Credential { status, message: msg.into() }
    }

    /// Human-readable text for the error callback.
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(msg) => msg.clone(),
            Self::Credential { message, .. } => message.clone(),
            Self::Permission(CaptureError::PermissionDenied) => {
                "Microphone access denied".to_string()
            }
            Self::Permission(e) => e.to_string(),
            Self::Transport(e) => e.to_string(),
            Self::Closed(category) => category.message().to_string(),
            Self::InvalidState(msg) => msg.clone(),
        }
    }
}

/// Failures acquiring or driving the capture stream.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Capture device unavailable: {0}")]
    Unavailable(String),

    #[error("Already capturing")]
    AlreadyCapturing,
}

/// Failures on the socket.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Transport is closed")]
    Closed,

    #[error("Close failed: {0}")]
    Close(String),
}

/// A single inbound audio payload that could not be decoded.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("PCM payload has odd length {0}")]
    OddLength(usize),

    #[error("Audio clip decode failed: {0}")]
    Clip(String),

    #[error("Audio clip contains no decodable track")]
    NoTrack,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_message() {
        let err = SessionError::from(CaptureError::PermissionDenied);
        assert_eq!(err.user_message(), "Microphone access denied");
    }

    #[test]
    fn test_credential_message_passthrough() {
        let err = SessionError::credential(Some(404), "Agent not found");
        assert_eq!(err.user_message(), "Agent not found");
        assert!(err.to_string().contains("Agent not found"));
    }

    #[test]
    fn test_closed_message_uses_category() {
        let err = SessionError::Closed(CloseCategory::ServerError);
        assert_eq!(err.user_message(), "Server error occurred");
        assert_eq!(err.to_string(), "Server error occurred");
    }
}
