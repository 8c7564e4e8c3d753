//! Twilio Media Streams message types
//!
//! Twilio sends JSON text frames tagged by `event`. Field names are camelCase
//! and sequence numbers are decimal strings.

use serde::{Deserialize, Serialize};

use crate::core::codec::MediaFormat;

/// Maximum allowed size for one inbound text frame (64 KB)
pub const MAX_TWILIO_MESSAGE_SIZE: usize = 64 * 1024;

/// Track name Twilio uses for audio played to the caller
pub const OUTBOUND_TRACK: &str = "outbound";

// =============================================================================
// Incoming Messages (Twilio -> Gateway)
// =============================================================================

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum TwilioInbound {
    /// First message on a new stream
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },

    /// Stream metadata, sent once before any media
    Start {
        #[serde(default)]
        sequence_number: Option<String>,
        stream_sid: String,
        start: StartMetadata,
    },

    /// One chunk of caller audio
    Media {
        #[serde(default)]
        sequence_number: Option<String>,
        stream_sid: String,
        media: InboundMedia,
    },

    /// A mark we sent finished playing
    Mark {
        #[serde(default)]
        sequence_number: Option<String>,
        stream_sid: String,
        mark: MarkPayload,
    },

    /// Keypad digit pressed by the caller
    Dtmf {
        #[serde(default)]
        sequence_number: Option<String>,
        stream_sid: String,
        dtmf: DtmfPayload,
    },

    /// The call ended or the stream was stopped
    Stop {
        #[serde(default)]
        sequence_number: Option<String>,
        stream_sid: String,
    },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default = "MediaFormat::mulaw_8k")]
    pub media_format: MediaFormat,
    #[serde(default)]
    pub custom_parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InboundMedia {
    #[serde(default)]
    pub track: Option<String>,
    /// Per-stream media counter starting at 1
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Base64 audio
    pub payload: String,
}

impl InboundMedia {
    pub fn is_outbound_track(&self) -> bool {
        self.track.as_deref() == Some(OUTBOUND_TRACK)
    }

    /// Parses the chunk counter used as the frame sequence number.
    pub fn chunk_number(&self) -> Option<u64> {
        self.chunk.as_deref()?.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DtmfPayload {
    #[serde(default)]
    pub track: Option<String>,
    pub digit: String,
}

// =============================================================================
// Outgoing Messages (Gateway -> Twilio)
// =============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum TwilioOutbound {
    /// Audio to play to the caller
    Media {
        stream_sid: String,
        media: OutboundMedia,
    },

    /// Ask Twilio to report back once playback reaches this point
    Mark {
        stream_sid: String,
        mark: MarkPayload,
    },

    /// Drop audio queued for playback
    Clear { stream_sid: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutboundMedia {
    pub payload: String,
}
