pub mod agent;
pub mod codec;
pub mod gateway;
pub mod guardrails;
pub mod realtime;
pub mod session;
pub mod tools;

// Re-export commonly used types for convenience
pub use agent::AgentConfig;
pub use gateway::{GatewaySettings, SessionGateway, SessionPermit};
pub use guardrails::{GuardrailChain, GuardrailResult, GuardrailVerdict, OutputGuardrail};
pub use realtime::{BackendEvent, BackendFactory, RealtimeBackend, RealtimeError};
pub use session::{
    CallerCommand, CloseReason, InboundEvent, Session, SessionError, SessionReport, SessionState,
};
pub use tools::{ToolDefinition, ToolError, ToolRegistry};
