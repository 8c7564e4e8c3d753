//! Configuration module for the gateway server
//!
//! Configuration comes from environment variables (a `.env` file is loaded into
//! the environment by `main`) and an optional YAML file. Priority:
//! YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use callbridge_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::core::agent::AgentConfig;
use crate::core::gateway::GatewaySettings;
use crate::core::realtime::{OpenAIRealtimeConfig, OpenAIRealtimeVoice};
use crate::core::session::SessionSettings;
use crate::core::guardrails::PatternGuardrail;

pub use yaml::YamlConfig;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5050;

/// Name of the guardrail built from `agent.patterns`.
pub const PATTERN_GUARDRAIL_NAME: &str = "Pattern rules";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Missing OpenAI API key. Please set it in the .env file.")]
    MissingApiKey,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Agent overrides. Unset fields keep the veterinary triage defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentSettings {
    pub name: Option<String>,
    pub instructions: Option<String>,
    pub fallback_utterance: Option<String>,
    /// Replaces the default blocklist when set
    pub blocklist: Option<Vec<String>>,
    /// Regular expressions checked after the blocklist; a match withholds the turn
    pub patterns: Option<Vec<String>>,
}

/// Server configuration
///
/// Contains everything needed to run the gateway:
/// - Server settings (host, port, public host for TwiML)
/// - OpenAI Realtime credentials and endpoint
/// - Session timing and limits
/// - Agent overrides
#[derive(Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Host placed in the TwiML stream URL; the request Host header is used when unset
    pub public_host: Option<String>,

    // Backend settings
    pub openai_api_key: String,
    pub openai_realtime_url: String,
    pub openai_realtime_model: String,
    pub openai_realtime_voice: OpenAIRealtimeVoice,

    // Session settings
    pub connect_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub reorder_window: usize,
    pub max_concurrent_sessions: Option<usize>,

    pub agent: AgentSettings,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("public_host", &self.public_host)
            .field("openai_api_key", &"<redacted>")
            .field("openai_realtime_url", &self.openai_realtime_url)
            .field("openai_realtime_model", &self.openai_realtime_model)
            .field("openai_realtime_voice", &self.openai_realtime_voice)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("idle_timeout_seconds", &self.idle_timeout_seconds)
            .field("reorder_window", &self.reorder_window)
            .field("max_concurrent_sessions", &self.max_concurrent_sessions)
            .field("agent", &self.agent)
            .finish()
    }
}

/// Zeroize the API key when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.openai_api_key.zeroize();
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only.
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format, the API key is
    /// missing, or validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base.
    ///
    /// Environment variables (with defaults) form the base and YAML values
    /// override them. The merged result is validated.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port".
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_seconds),
            idle_timeout: Duration::from_secs(self.idle_timeout_seconds),
            reorder_window: self.reorder_window,
            ..SessionSettings::default()
        }
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            session: self.session_settings(),
            max_concurrent_sessions: self.max_concurrent_sessions,
        }
    }

    /// Connection settings for the OpenAI Realtime backend.
    pub fn backend_config(&self) -> OpenAIRealtimeConfig {
        let mut config = OpenAIRealtimeConfig::new(self.openai_api_key.clone());
        config.url = self.openai_realtime_url.clone();
        config.model = self.openai_realtime_model.clone();
        config.voice = self.openai_realtime_voice;
        config
    }

    /// Builds the veterinary triage agent with the configured overrides.
    pub fn agent_config(&self) -> Result<AgentConfig, ConfigError> {
        let agent = match &self.agent.blocklist {
            Some(terms) => AgentConfig::veterinary_triage_with_blocklist(terms.iter().cloned()),
            None => AgentConfig::veterinary_triage(),
        };
        let mut agent = agent.map_err(|e| ConfigError::Invalid(format!("agent tools: {e}")))?;

        if let Some(patterns) = self.agent.patterns.as_ref().filter(|p| !p.is_empty()) {
            let guardrail = PatternGuardrail::new(PATTERN_GUARDRAIL_NAME, patterns).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "agent.patterns".to_string(),
                    message: e.to_string(),
                }
            })?;
            agent = agent.with_output_guardrail(guardrail);
        }
        if let Some(name) = &self.agent.name {
            agent.name = name.clone();
        }
        if let Some(instructions) = &self.agent.instructions {
            agent.instructions = instructions.clone();
        }
        if let Some(utterance) = &self.agent.fallback_utterance {
            agent.fallback_utterance = utterance.clone();
        }
        Ok(agent)
    }
}
