use base64::prelude::*;
use bytes::Bytes;

use super::CodecError;
use super::format::{
    AudioEncoding, AudioFormat, AudioFrame, CallerFrame, MediaFormat, SUPPORTED_PCM_RATES,
    TELEPHONY_SAMPLE_RATE,
};

/// Converts frames between the caller's media-stream format and the backend's
/// raw audio format.
///
/// Both directions are pure: the adapter holds no per-session state, so one
/// instance can be shared freely. On well-formed input
/// `to_caller_format(to_backend_format(f)) == f`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    backend_sample_rate: Option<u32>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks frames whose rate differs from `sample_rate` with a resample hint.
    pub fn with_backend_sample_rate(sample_rate: u32) -> Self {
        Self {
            backend_sample_rate: Some(sample_rate),
        }
    }

    /// Checks a caller media format and returns the backend encoding it maps to.
    pub fn check_caller_format(format: &MediaFormat) -> Result<AudioEncoding, CodecError> {
        let encoding = AudioEncoding::from_caller_tag(&format.encoding)
            .ok_or_else(|| CodecError::UnsupportedFormat(format!("encoding '{}'", format.encoding)))?;
        check_layout(encoding, format.sample_rate, format.channels)?;
        Ok(encoding)
    }

    pub fn to_backend_format(&self, frame: &CallerFrame) -> Result<AudioFrame, CodecError> {
        let encoding = Self::check_caller_format(&frame.format)?;

        let mut bytes = BASE64_STANDARD
            .decode(frame.payload.as_bytes())
            .map_err(|e| CodecError::MalformedPayload(format!("invalid base64: {e}")))?;

        if encoding == AudioEncoding::Pcm16 {
            swap_sample_bytes(&mut bytes)?;
        }

        let resample_to = self
            .backend_sample_rate
            .filter(|rate| *rate != frame.format.sample_rate);

        Ok(AudioFrame {
            payload: Bytes::from(bytes),
            format: AudioFormat {
                encoding,
                sample_rate: frame.format.sample_rate,
                channels: frame.format.channels,
            },
            sequence: frame.sequence,
            resample_to,
        })
    }

    pub fn to_caller_format(&self, frame: &AudioFrame) -> Result<CallerFrame, CodecError> {
        let format = frame.format;
        check_layout(format.encoding, format.sample_rate, format.channels)?;

        let payload = if format.encoding == AudioEncoding::Pcm16 {
            let mut bytes = frame.payload.to_vec();
            swap_sample_bytes(&mut bytes)?;
            BASE64_STANDARD.encode(bytes)
        } else {
            BASE64_STANDARD.encode(&frame.payload)
        };

        Ok(CallerFrame {
            payload,
            format: MediaFormat::new(format.encoding.caller_tag(), format.sample_rate, format.channels),
            sequence: frame.sequence,
        })
    }
}

fn check_layout(encoding: AudioEncoding, sample_rate: u32, channels: u8) -> Result<(), CodecError> {
    if channels != 1 {
        return Err(CodecError::UnsupportedFormat(format!(
            "{channels} channels (only mono is relayed)"
        )));
    }

    let rate_ok = match encoding {
        AudioEncoding::G711Ulaw | AudioEncoding::G711Alaw => sample_rate == TELEPHONY_SAMPLE_RATE,
        AudioEncoding::Pcm16 => SUPPORTED_PCM_RATES.contains(&sample_rate),
    };
    if !rate_ok {
        return Err(CodecError::UnsupportedFormat(format!(
            "{encoding} at {sample_rate} Hz"
        )));
    }

    Ok(())
}

/// Swaps the two bytes of every 16-bit sample in place. Used for both
/// directions since big-endian <-> little-endian is its own inverse.
fn swap_sample_bytes(bytes: &mut [u8]) -> Result<(), CodecError> {
    if bytes.len() % 2 != 0 {
        return Err(CodecError::MalformedPayload(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }
    for sample in bytes.chunks_exact_mut(2) {
        sample.swap(0, 1);
    }
    Ok(())
}
