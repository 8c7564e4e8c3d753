//! OpenAI Realtime API backend.
//!
//! Streams telephony audio (G.711 mu-law at 8 kHz by default) to the
//! Realtime API over WebSocket, with server-side VAD and function calling.
//!
//! # Example
//!
//! ```rust,ignore
//! use callbridge_gateway::core::realtime::{OpenAIRealtime, OpenAIRealtimeConfig};
//!
//! let factory = OpenAIRealtime::factory(OpenAIRealtimeConfig::new("sk-..."));
//! let mut backend = factory()?;
//! let mut events = backend.connect(&setup).await?;
//! while let Some(event) = events.recv().await {
//!     // ...
//! }
//! ```

mod client;
mod config;
mod messages;

pub use client::OpenAIRealtime;
pub use config::{
    DEFAULT_REALTIME_MODEL, OPENAI_REALTIME_URL, OpenAIRealtimeConfig, OpenAIRealtimeVoice,
};
pub use messages::{ClientEvent, ServerEvent};
