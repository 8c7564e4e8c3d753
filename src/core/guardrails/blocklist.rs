use async_trait::async_trait;

use super::base::{GuardrailResult, OutputGuardrail};

/// Trips when the turn text contains any blocklisted term as a substring.
#[derive(Debug, Clone)]
pub struct BlocklistGuardrail {
    name: String,
    terms: Vec<String>,
    case_sensitive: bool,
}

impl BlocklistGuardrail {
    pub fn new<I, S>(name: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            terms: terms
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
            case_sensitive: false,
        }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

#[async_trait]
impl OutputGuardrail for BlocklistGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, turn_text: &str) -> GuardrailResult {
        let haystack = if self.case_sensitive {
            turn_text.to_string()
        } else {
            turn_text.to_lowercase()
        };

        let matched: Vec<String> = self
            .terms
            .iter()
            .filter(|term| {
                if self.case_sensitive {
                    haystack.contains(term.as_str())
                } else {
                    haystack.contains(&term.to_lowercase())
                }
            })
            .cloned()
            .collect();

        if matched.is_empty() {
            GuardrailResult::pass(&self.name)
        } else {
            GuardrailResult::tripped(&self.name, "blocklisted_term", matched)
        }
    }
}
