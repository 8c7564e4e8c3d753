use super::env::{env_var, parse_env};
use super::yaml::YamlConfig;
use super::{AgentSettings, ConfigError, DEFAULT_HOST, DEFAULT_PORT, ServerConfig};
use crate::core::realtime::openai::DEFAULT_REALTIME_MODEL;
use crate::core::realtime::{OPENAI_REALTIME_URL, OpenAIRealtimeVoice};
use crate::core::session::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_REORDER_WINDOW};

/// Merges environment variables (base) with optional YAML overrides.
pub(super) fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, ConfigError> {
    let yaml = yaml.unwrap_or_default();
    let server = yaml.server.unwrap_or_default();
    let backend = yaml.backend.unwrap_or_default();
    let session = yaml.session.unwrap_or_default();
    let agent = yaml.agent.unwrap_or_default();

    let host = server
        .host
        .or_else(|| env_var("HOST"))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = match server.port {
        Some(port) => port,
        None => parse_env("PORT")?.unwrap_or(DEFAULT_PORT),
    };
    let public_host = server.public_host.or_else(|| env_var("PUBLIC_HOST"));

    let openai_api_key = backend
        .api_key
        .or_else(|| env_var("OPENAI_API_KEY"))
        .ok_or(ConfigError::MissingApiKey)?;
    let openai_realtime_url = backend
        .url
        .or_else(|| env_var("OPENAI_REALTIME_URL"))
        .unwrap_or_else(|| OPENAI_REALTIME_URL.to_string());
    let openai_realtime_model = backend
        .model
        .or_else(|| env_var("OPENAI_REALTIME_MODEL"))
        .unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string());
    let openai_realtime_voice = match backend.voice.or_else(|| env_var("OPENAI_REALTIME_VOICE")) {
        Some(voice) => OpenAIRealtimeVoice::parse(&voice).ok_or_else(|| ConfigError::InvalidValue {
            key: "voice".to_string(),
            message: format!("unknown voice '{voice}'"),
        })?,
        None => OpenAIRealtimeVoice::default(),
    };

    let connect_timeout_seconds = match session.connect_timeout_seconds {
        Some(secs) => secs,
        None => parse_env("CONNECT_TIMEOUT_SECONDS")?.unwrap_or(DEFAULT_CONNECT_TIMEOUT.as_secs()),
    };
    let idle_timeout_seconds = match session.idle_timeout_seconds {
        Some(secs) => secs,
        None => parse_env("IDLE_TIMEOUT_SECONDS")?.unwrap_or(DEFAULT_IDLE_TIMEOUT.as_secs()),
    };
    let reorder_window = match session.reorder_window {
        Some(window) => window,
        None => parse_env("REORDER_WINDOW")?.unwrap_or(DEFAULT_REORDER_WINDOW),
    };
    let max_concurrent_sessions = match session.max_concurrent_sessions {
        Some(max) => Some(max),
        None => parse_env("MAX_CONCURRENT_SESSIONS")?,
    };

    Ok(ServerConfig {
        host,
        port,
        public_host,
        openai_api_key,
        openai_realtime_url,
        openai_realtime_model,
        openai_realtime_voice,
        connect_timeout_seconds,
        idle_timeout_seconds,
        reorder_window,
        max_concurrent_sessions,
        agent: AgentSettings {
            name: agent.name,
            instructions: agent.instructions,
            fallback_utterance: agent.fallback_utterance,
            blocklist: agent.blocklist,
            patterns: agent.patterns,
        },
    })
}
