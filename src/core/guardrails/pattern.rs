use async_trait::async_trait;
use regex::Regex;

use super::base::{GuardrailResult, OutputGuardrail};

/// Trips when any of a set of regular expressions matches the turn text.
#[derive(Debug, Clone)]
pub struct PatternGuardrail {
    name: String,
    kind: String,
    patterns: Vec<Regex>,
}

impl PatternGuardrail {
    pub fn new<I, S>(name: impl Into<String>, patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.into(),
            kind: "pattern_match".to_string(),
            patterns,
        })
    }

    /// Overrides the violation kind reported in diagnostics.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }
}

#[async_trait]
impl OutputGuardrail for PatternGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, turn_text: &str) -> GuardrailResult {
        let matched: Vec<String> = self
            .patterns
            .iter()
            .filter_map(|re| re.find(turn_text).map(|m| m.as_str().to_string()))
            .collect();

        if matched.is_empty() {
            GuardrailResult::pass(&self.name)
        } else {
            GuardrailResult::tripped(&self.name, &self.kind, matched)
        }
    }
}
