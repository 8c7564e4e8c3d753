use std::time::Duration;

use thiserror::Error;

use crate::core::codec::CodecError;
use crate::core::realtime::RealtimeError;

/// WebSocket close codes used when ending the caller stream.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const UNSUPPORTED_DATA: u16 = 1003;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const INTERNAL_ERROR: u16 = 1011;
    pub const TRY_AGAIN_LATER: u16 = 1013;
}

/// Errors that are fatal to exactly one session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Backend connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Backend connection failed: {0}")]
    BackendConnect(#[source] RealtimeError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Backend protocol error: {0}")]
    BackendProtocol(String),

    #[error("Backend send failed: {0}")]
    Backend(#[from] RealtimeError),

    #[error("Session is closed")]
    Closed,
}

impl SessionError {
    /// Close code sent to the caller when this error ends the session.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::ConnectTimeout(_) => close_code::TRY_AGAIN_LATER,
            Self::Codec(CodecError::UnsupportedFormat(_)) => close_code::UNSUPPORTED_DATA,
            Self::Codec(CodecError::MalformedPayload(_)) => close_code::INVALID_PAYLOAD,
            Self::BackendConnect(_) | Self::BackendProtocol(_) | Self::Backend(_) => {
                close_code::INTERNAL_ERROR
            }
            Self::Closed => close_code::NORMAL,
        }
    }

    /// Short machine-readable reason sent with the close frame.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::BackendConnect(_) => "backend_unavailable",
            Self::Codec(CodecError::UnsupportedFormat(_)) => "unsupported_format",
            Self::Codec(CodecError::MalformedPayload(_)) => "malformed_audio",
            Self::BackendProtocol(_) => "backend_protocol_error",
            Self::Backend(_) => "backend_error",
            Self::Closed => "closed",
        }
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The caller sent `stop` or the inbound stream ended
    CallerHangup,
    /// The backend closed its connection
    BackendClosed(String),
    /// No caller or backend activity within the idle period
    IdleTimeout,
    /// Closed on request by the owner of the session
    Requested,
    /// A session-fatal error
    Fatal(SessionError),
}

impl CloseReason {
    pub fn close_code(&self) -> u16 {
        match self {
            Self::CallerHangup | Self::Requested => close_code::NORMAL,
            Self::BackendClosed(_) | Self::IdleTimeout => close_code::GOING_AWAY,
            Self::Fatal(err) => err.close_code(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::CallerHangup => "caller_hangup",
            Self::BackendClosed(_) => "backend_closed",
            Self::IdleTimeout => "idle_timeout",
            Self::Requested => "normal",
            Self::Fatal(err) => err.code(),
        }
    }

    /// Whether the backend can still take the frames held for reordering.
    pub(crate) fn backend_usable(&self) -> bool {
        match self {
            Self::CallerHangup | Self::IdleTimeout | Self::Requested => true,
            Self::Fatal(SessionError::Codec(_)) => true,
            Self::BackendClosed(_) | Self::Fatal(_) => false,
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BackendClosed(reason) => write!(f, "backend closed: {reason}"),
            Self::Fatal(err) => write!(f, "{err}"),
            other => f.write_str(other.code()),
        }
    }
}
