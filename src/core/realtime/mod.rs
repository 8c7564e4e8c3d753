//! Realtime conversational backends.
//!
//! [`RealtimeBackend`] abstracts one streaming connection to a conversational
//! model. The OpenAI Realtime API is the production implementation.

mod base;
pub mod openai;

pub use base::{
    BackendEvent, BackendFactory, BoxedBackend, PROTOCOL_ERROR_CODE, RealtimeBackend,
    RealtimeError, RealtimeResult, SessionSetup,
};
pub use openai::{OPENAI_REALTIME_URL, OpenAIRealtime, OpenAIRealtimeConfig, OpenAIRealtimeVoice};
