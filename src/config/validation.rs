use tokio::sync::Semaphore;

use super::{ConfigError, ServerConfig};

/// Longest accepted backend connect timeout.
pub const MAX_CONNECT_TIMEOUT_SECONDS: u64 = 300;

/// Longest accepted idle timeout (one day).
pub const MAX_IDLE_TIMEOUT_SECONDS: u64 = 86_400;

/// Largest accepted reorder window, in frames.
pub const MAX_REORDER_WINDOW: usize = 4096;

/// Checks the merged configuration for values the gateway cannot run with.
pub(super) fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.port == 0 {
        return Err(ConfigError::Invalid("port must be non-zero".to_string()));
    }
    if config.openai_api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("OpenAI API key is empty".to_string()));
    }
    if !config.openai_realtime_url.starts_with("wss://")
        && !config.openai_realtime_url.starts_with("ws://")
    {
        return Err(ConfigError::Invalid(format!(
            "realtime URL must use ws:// or wss://, got '{}'",
            config.openai_realtime_url
        )));
    }
    if !(1..=MAX_CONNECT_TIMEOUT_SECONDS).contains(&config.connect_timeout_seconds) {
        return Err(ConfigError::Invalid(format!(
            "connect timeout must be between 1 and {MAX_CONNECT_TIMEOUT_SECONDS} seconds, got {}",
            config.connect_timeout_seconds
        )));
    }
    if !(1..=MAX_IDLE_TIMEOUT_SECONDS).contains(&config.idle_timeout_seconds) {
        return Err(ConfigError::Invalid(format!(
            "idle timeout must be between 1 and {MAX_IDLE_TIMEOUT_SECONDS} seconds, got {}",
            config.idle_timeout_seconds
        )));
    }
    if !(1..=MAX_REORDER_WINDOW).contains(&config.reorder_window) {
        return Err(ConfigError::Invalid(format!(
            "reorder window must hold between 1 and {MAX_REORDER_WINDOW} frames, got {}",
            config.reorder_window
        )));
    }
    if let Some(max) = config.max_concurrent_sessions
        && !(1..=Semaphore::MAX_PERMITS).contains(&max)
    {
        return Err(ConfigError::Invalid(format!(
            "max concurrent sessions must be between 1 and {}, got {max}",
            Semaphore::MAX_PERMITS
        )));
    }
    Ok(())
}
