use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 5050
///   public_host: "calls.example.com"
///
/// backend:
///   api_key: "sk-..."
///   url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-4o-realtime-preview"
///   voice: "alloy"
///
/// session:
///   connect_timeout_seconds: 10
///   idle_timeout_seconds: 60
///   reorder_window: 64
///   max_concurrent_sessions: 100
///
/// agent:
///   name: "Triage Agent"
///   instructions: "You are a helpful assistant at a veterinary office."
///   fallback_utterance: "I'm sorry, I can't help with that."
///   blocklist: ["diagnosis", "discount", "cure", "refund"]
///   patterns: ['\$\d+']
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub backend: Option<BackendYaml>,
    pub session: Option<SessionYaml>,
    pub agent: Option<AgentYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_host: Option<String>,
}

/// Realtime backend configuration from YAML
#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackendYaml {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
}

impl std::fmt::Debug for BackendYaml {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendYaml")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("url", &self.url)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .finish()
    }
}

/// Session limits from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub connect_timeout_seconds: Option<u64>,
    pub idle_timeout_seconds: Option<u64>,
    pub reorder_window: Option<usize>,
    pub max_concurrent_sessions: Option<usize>,
}

/// Agent overrides from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AgentYaml {
    pub name: Option<String>,
    pub instructions: Option<String>,
    pub fallback_utterance: Option<String>,
    pub blocklist: Option<Vec<String>>,
    pub patterns: Option<Vec<String>>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_yaml::from_str(&contents)?)
    }
}
