//! Base trait and types for realtime conversational backends.
//!
//! A backend is one streaming connection to a conversational model: caller
//! audio goes in, generated audio, transcripts and tool-call requests come
//! back out as [`BackendEvent`]s on a channel.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::codec::{AudioFormat, AudioFrame};
use crate::core::tools::ToolSpec;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to a realtime backend.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the backend failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Session Setup
// =============================================================================

/// Everything the backend needs to configure a new conversation.
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub session_id: String,
    pub instructions: String,
    pub tools: Vec<ToolSpec>,
    /// Format of audio in both directions
    pub audio_format: AudioFormat,
}

// =============================================================================
// Events
// =============================================================================

/// Events emitted by a backend connection.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// A chunk of generated audio for a response
    AudioDelta { response_id: String, audio: Bytes },
    /// A chunk of the transcript of generated audio
    TranscriptDelta { response_id: String, delta: String },
    /// The complete transcript of a response's audio
    TranscriptDone { response_id: String, transcript: String },
    /// The response is finished; this is the turn boundary
    TurnComplete { response_id: String },
    /// The response ended without completing (cancelled, failed or cut short)
    TurnAborted { response_id: String, status: String },
    /// The model wants a tool invoked
    ToolCallRequest {
        call_id: String,
        name: String,
        /// JSON-encoded arguments
        arguments: String,
    },
    /// The caller started speaking (barge-in)
    SpeechStarted,
    /// The backend reported an error or sent something undecodable
    Error { code: String, message: String },
    /// The connection ended
    Closed { reason: String },
}

impl BackendEvent {
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::Error {
            code: PROTOCOL_ERROR_CODE.to_string(),
            message: message.into(),
        }
    }
}

/// Error code used for messages that cannot be decoded.
pub const PROTOCOL_ERROR_CODE: &str = "protocol_error";

// =============================================================================
// Backend Trait
// =============================================================================

/// One connection to a realtime conversational backend.
///
/// Connection failures are reported, never retried: reconnecting mid-call
/// would desynchronize the audio.
#[async_trait]
pub trait RealtimeBackend: Send + Sync {
    /// Opens the connection and configures the conversation. The returned
    /// channel yields events until the connection ends.
    async fn connect(&mut self, setup: &SessionSetup) -> RealtimeResult<mpsc::Receiver<BackendEvent>>;

    /// Appends caller audio to the conversation.
    async fn send_audio(&mut self, frame: &AudioFrame) -> RealtimeResult<()>;

    /// Returns a tool result for an earlier [`BackendEvent::ToolCallRequest`].
    async fn send_tool_result(&mut self, call_id: &str, output: &str) -> RealtimeResult<()>;

    /// Asks the backend to say `text` verbatim as its next turn.
    async fn speak(&mut self, text: &str) -> RealtimeResult<()>;

    /// Closes the connection. Safe to call more than once.
    async fn disconnect(&mut self) -> RealtimeResult<()>;

    fn is_connected(&self) -> bool;
}

/// Boxed backend owned by a session.
pub type BoxedBackend = Box<dyn RealtimeBackend>;

/// Builds a fresh backend for each session.
pub type BackendFactory = Arc<dyn Fn() -> RealtimeResult<BoxedBackend> + Send + Sync>;
