//! Lifecycle of one bridged call.
//!
//! A [`Session`] owns the backend connection for a single call and applies
//! caller events, backend events and tool completions one at a time as
//! explicit state transitions.

mod error;
mod events;
mod machine;
mod state;
mod turn;

pub use error::{CloseReason, SessionError, close_code};
pub use events::{CallerCommand, InboundEvent};
pub use machine::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_REORDER_WINDOW, Session,
    SessionReport, SessionSettings, SessionStats,
};
pub use state::SessionState;
pub use turn::{Turn, TurnBuffer};
