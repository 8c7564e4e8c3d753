use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::base::{GuardrailResult, OutputGuardrail};

/// Default upper bound on a single guardrail evaluation.
pub const DEFAULT_GUARDRAIL_TIMEOUT: Duration = Duration::from_secs(2);

/// Every guardrail's result for one turn, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GuardrailVerdict {
    pub results: Vec<GuardrailResult>,
}

impl GuardrailVerdict {
    /// True when at least one guardrail tripped.
    pub fn tripped(&self) -> bool {
        self.results.iter().any(|r| r.tripwire_triggered)
    }

    pub fn tripped_guardrails(&self) -> impl Iterator<Item = &GuardrailResult> {
        self.results.iter().filter(|r| r.tripwire_triggered)
    }
}

/// Ordered set of output guardrails applied to each complete turn.
///
/// All guardrails run even after one trips, so the verdict always carries the
/// full diagnostic set. A guardrail that does not answer within the timeout
/// counts as tripped.
#[derive(Clone)]
pub struct GuardrailChain {
    guardrails: Vec<Arc<dyn OutputGuardrail>>,
    timeout: Duration,
}

impl GuardrailChain {
    pub fn new() -> Self {
        Self {
            guardrails: Vec::new(),
            timeout: DEFAULT_GUARDRAIL_TIMEOUT,
        }
    }

    pub fn with(mut self, guardrail: impl OutputGuardrail + 'static) -> Self {
        self.guardrails.push(Arc::new(guardrail));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register(&mut self, guardrail: Arc<dyn OutputGuardrail>) {
        self.guardrails.push(guardrail);
    }

    pub fn len(&self) -> usize {
        self.guardrails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guardrails.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.guardrails.iter().map(|g| g.name()).collect()
    }

    pub async fn evaluate(&self, turn_text: &str) -> GuardrailVerdict {
        let mut results = Vec::with_capacity(self.guardrails.len());
        for guardrail in &self.guardrails {
            let result = match tokio::time::timeout(self.timeout, guardrail.execute(turn_text)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        guardrail = guardrail.name(),
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Guardrail timed out, withholding turn"
                    );
                    GuardrailResult::tripped(guardrail.name(), "timeout", Vec::new())
                }
            };
            results.push(result);
        }
        GuardrailVerdict { results }
    }
}

impl Default for GuardrailChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GuardrailChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardrailChain")
            .field("guardrails", &self.names())
            .field("timeout", &self.timeout)
            .finish()
    }
}
