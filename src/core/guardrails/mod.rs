//! Output guardrails evaluated over complete turns before release to the caller.

mod base;
mod blocklist;
mod chain;
mod pattern;

pub use base::{GuardrailDiagnostic, GuardrailResult, OutputGuardrail};
pub use blocklist::BlocklistGuardrail;
pub use chain::{DEFAULT_GUARDRAIL_TIMEOUT, GuardrailChain, GuardrailVerdict};
pub use pattern::PatternGuardrail;
