use async_trait::async_trait;
use serde::Serialize;

/// Structured description of why a guardrail tripped (or didn't).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GuardrailDiagnostic {
    /// Kind of violation, `None` when the text passed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Terms or patterns that matched
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matched_terms: Vec<String>,
}

/// Result of evaluating one guardrail against one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardrailResult {
    pub guardrail: String,
    pub tripwire_triggered: bool,
    pub output_info: GuardrailDiagnostic,
}

impl GuardrailResult {
    pub fn pass(guardrail: impl Into<String>) -> Self {
        Self {
            guardrail: guardrail.into(),
            tripwire_triggered: false,
            output_info: GuardrailDiagnostic::default(),
        }
    }

    pub fn tripped(guardrail: impl Into<String>, kind: impl Into<String>, matched_terms: Vec<String>) -> Self {
        Self {
            guardrail: guardrail.into(),
            tripwire_triggered: true,
            output_info: GuardrailDiagnostic {
                kind: Some(kind.into()),
                matched_terms,
            },
        }
    }
}

/// A check applied to a complete turn of generated output before release.
///
/// Implementations must be deterministic over the turn text and must not
/// touch session state; everything they report goes through the result.
#[async_trait]
pub trait OutputGuardrail: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, turn_text: &str) -> GuardrailResult;
}
