//! Agent configuration shared by every session.

use std::sync::Arc;

use crate::core::guardrails::{BlocklistGuardrail, GuardrailChain, OutputGuardrail};
use crate::core::tools::{ToolError, ToolRegistry, ToolSpec, builtin};

/// Terms the veterinary deployment never lets through to the caller.
pub const VET_BLOCKLIST: &[&str] = &["diagnosis", "discount", "cure", "refund"];

pub const DEFAULT_FALLBACK_UTTERANCE: &str =
    "I'm sorry, I can't help with that. Is there anything else I can do for you?";

/// Instructions, tools and guardrails for the conversational agent.
///
/// Built once at startup and shared immutably with every session.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub instructions: String,
    pub tools: Arc<ToolRegistry>,
    pub guardrails: Arc<GuardrailChain>,
    /// Spoken in place of a turn withheld by a guardrail
    pub fallback_utterance: String,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            tools: Arc::new(ToolRegistry::new()),
            guardrails: Arc::new(GuardrailChain::new()),
            fallback_utterance: DEFAULT_FALLBACK_UTTERANCE.to_string(),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailChain) -> Self {
        self.guardrails = Arc::new(guardrails);
        self
    }

    /// Appends a guardrail after the ones already configured.
    pub fn with_output_guardrail(mut self, guardrail: impl OutputGuardrail + 'static) -> Self {
        Arc::make_mut(&mut self.guardrails).register(Arc::new(guardrail));
        self
    }

    pub fn with_fallback_utterance(mut self, utterance: impl Into<String>) -> Self {
        self.fallback_utterance = utterance.into();
        self
    }

    /// Tool descriptions exported to the backend at session setup.
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools.specs()
    }

    /// Front-desk agent for a veterinary office: books appointments and never
    /// talks about diagnoses, discounts, cures or refunds.
    pub fn veterinary_triage() -> Result<Self, ToolError> {
        Self::veterinary_triage_with_blocklist(VET_BLOCKLIST.iter().copied())
    }

    pub fn veterinary_triage_with_blocklist<I, S>(blocklist: I) -> Result<Self, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tools = ToolRegistry::new().with_tool(builtin::schedule_appointment())?;
        let guardrails =
            GuardrailChain::new().with(BlocklistGuardrail::new("Blocklist terms", blocklist));

        Ok(Self::new(
            "Triage Agent",
            "You are a helpful assistant at a veterinary office.",
        )
        .with_tools(tools)
        .with_guardrails(guardrails))
    }
}
