//! Transport-neutral messages exchanged between a session and its caller.

use crate::core::codec::{CallerFrame, MediaFormat};

/// Something the caller's media stream reported.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// The stream started; announces the media format and the sequence
    /// number the first media frame will carry.
    Start {
        stream_id: String,
        format: MediaFormat,
        first_sequence: u64,
    },
    /// One audio chunk
    Media(CallerFrame),
    /// The caller finished playing back a mark we sent
    Mark { name: String },
    /// A keypad digit
    Dtmf { digit: String },
    /// The caller hung up
    Stop,
}

/// Something the session wants the caller's media stream to do.
#[derive(Debug, Clone, PartialEq)]
pub enum CallerCommand {
    /// Play an audio chunk
    Media(CallerFrame),
    /// Report back once playback reaches this point
    Mark { name: String },
    /// Drop any audio queued for playback
    Clear,
    /// End the stream
    Close { code: u16, reason: String },
}
