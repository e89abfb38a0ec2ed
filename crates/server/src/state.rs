use crate::config::ServerConfig;
use measure_saver::{AllowedKeys, MeasurementStore};
use std::sync::Arc;

/// Shared application state
///
/// Built once at startup; nothing in here changes while serving.
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Insert gateway shared by all requests
    pub store: Arc<dyn MeasurementStore>,

    /// Allowed API keys; `None` when no key file is configured
    pub allowed_keys: Option<Arc<AllowedKeys>>,
}

impl ServerState {
    /// Create new server state
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn MeasurementStore>,
        allowed_keys: Option<AllowedKeys>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            allowed_keys: allowed_keys.map(Arc::new),
        }
    }

    /// Whether the API key gate is active
    pub fn key_gate_enabled(&self) -> bool {
        self.allowed_keys.is_some()
    }

    /// Check if API key is valid. Always true while the gate is disabled.
    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.allowed_keys
            .as_ref()
            .is_none_or(|keys| keys.is_allowed(key))
    }
}

/// Server metadata for health checks
#[derive(Debug, serde::Serialize)]
pub struct ServerMetadata {
    pub version: String,
    pub uptime_seconds: u64,
}
