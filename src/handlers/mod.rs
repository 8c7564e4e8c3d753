//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check and TwiML endpoints
//! - `media_stream` - Twilio Media Streams WebSocket

pub mod api;
pub mod media_stream;

pub use media_stream::media_stream_handler;
