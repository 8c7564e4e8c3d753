//! Audio frame codec adapter.
//!
//! Converts between the telephony transport's chunk format and the backend
//! session's audio format, and restores per-direction frame order.

mod adapter;
pub mod format;
mod reorder;

use thiserror::Error;

pub use adapter::FrameCodec;
pub use format::{AudioEncoding, AudioFormat, AudioFrame, CallerFrame, MediaFormat};
pub use reorder::{Admission, SequenceReorderer};

/// Errors produced while converting audio frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The format tag, sample rate or channel layout is not recognised
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The payload could not be decoded for a recognised format
    #[error("Malformed audio payload: {0}")]
    MalformedPayload(String),
}
