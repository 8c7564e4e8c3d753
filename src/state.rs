use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::SessionGateway;

/// Shared state for HTTP and WebSocket handlers.
pub struct AppState {
    pub config: ServerConfig,
    pub gateway: SessionGateway,
}

impl AppState {
    pub fn new(config: ServerConfig, gateway: SessionGateway) -> Arc<Self> {
        Arc::new(Self { config, gateway })
    }
}
