//! Twilio Media Streams WebSocket handlers
//!
//! # Protocol
//!
//! ## Twilio → Gateway
//!
//! - **connected**: Stream opened
//! - **start**: Stream metadata including the media format
//! - **media**: Base64 caller audio, numbered by `chunk`
//! - **mark**: Playback of a mark we sent finished
//! - **dtmf**: Keypad digit
//! - **stop**: Call ended
//!
//! ## Gateway → Twilio
//!
//! - **media**: Base64 audio to play to the caller
//! - **mark**: Named playback marker, sent after each released turn
//! - **clear**: Drop queued playback (caller barge-in)

mod handler;
pub mod messages;

pub use handler::media_stream_handler;
