//! Audio format and frame types shared by both sides of the relay.
//!
//! The caller side (telephony media stream) describes audio with a MIME-like
//! encoding tag such as `audio/x-mulaw` and carries payloads as base64 text.
//! The backend side works on raw bytes tagged with an [`AudioEncoding`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Caller-side encoding tag for G.711 mu-law.
pub const CALLER_MULAW: &str = "audio/x-mulaw";
/// Caller-side encoding tag for G.711 A-law.
pub const CALLER_ALAW: &str = "audio/x-alaw";
/// Caller-side encoding tag for 16-bit linear PCM (network byte order).
pub const CALLER_L16: &str = "audio/l16";

/// Sample rate G.711 telephony audio is always carried at.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Linear PCM sample rates the codec accepts.
pub const SUPPORTED_PCM_RATES: &[u32] = &[8000, 16000, 24000, 48000];

// =============================================================================
// Backend side
// =============================================================================

/// Audio encodings understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioEncoding {
    /// 16-bit signed little-endian PCM
    #[serde(rename = "pcm16")]
    Pcm16,
    /// G.711 mu-law
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
    /// G.711 A-law
    #[serde(rename = "g711_alaw")]
    G711Alaw,
}

impl AudioEncoding {
    /// Wire name used by the backend protocol.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm16 => "pcm16",
            Self::G711Ulaw => "g711_ulaw",
            Self::G711Alaw => "g711_alaw",
        }
    }

    /// The caller-side tag carrying the same samples.
    #[inline]
    pub fn caller_tag(&self) -> &'static str {
        match self {
            Self::Pcm16 => CALLER_L16,
            Self::G711Ulaw => CALLER_MULAW,
            Self::G711Alaw => CALLER_ALAW,
        }
    }

    /// Maps a caller-side tag to the backend encoding, if recognised.
    pub fn from_caller_tag(tag: &str) -> Option<Self> {
        match tag {
            CALLER_MULAW => Some(Self::G711Ulaw),
            CALLER_ALAW => Some(Self::G711Alaw),
            CALLER_L16 => Some(Self::Pcm16),
            _ => None,
        }
    }
}

impl std::fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Format of backend-side audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
    pub channels: u8,
}

impl AudioFormat {
    /// 8 kHz mono mu-law, the native telephony format.
    pub fn g711_ulaw() -> Self {
        Self {
            encoding: AudioEncoding::G711Ulaw,
            sample_rate: TELEPHONY_SAMPLE_RATE,
            channels: 1,
        }
    }

    /// 8 kHz mono A-law.
    pub fn g711_alaw() -> Self {
        Self {
            encoding: AudioEncoding::G711Alaw,
            sample_rate: TELEPHONY_SAMPLE_RATE,
            channels: 1,
        }
    }

    /// Mono little-endian PCM16 at the given rate.
    pub fn pcm16(sample_rate: u32) -> Self {
        Self {
            encoding: AudioEncoding::Pcm16,
            sample_rate,
            channels: 1,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::g711_ulaw()
    }
}

/// One chunk of backend-side audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Raw audio bytes in `format`
    pub payload: Bytes,
    pub format: AudioFormat,
    /// Per-direction sequence number
    pub sequence: u64,
    /// Set when the backend expects a different sample rate than the frame
    /// carries; resampling itself is left to the backend.
    pub resample_to: Option<u32>,
}

// =============================================================================
// Caller side
// =============================================================================

/// Media format announced by the telephony stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u8,
}

impl MediaFormat {
    pub fn new(encoding: impl Into<String>, sample_rate: u32, channels: u8) -> Self {
        Self {
            encoding: encoding.into(),
            sample_rate,
            channels,
        }
    }

    /// 8 kHz mono mu-law, what Twilio Media Streams send by default.
    pub fn mulaw_8k() -> Self {
        Self::new(CALLER_MULAW, TELEPHONY_SAMPLE_RATE, 1)
    }
}

/// One chunk of caller-side audio, as carried by the media stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerFrame {
    /// Base64-encoded audio
    pub payload: String,
    pub format: MediaFormat,
    pub sequence: u64,
}
