//! Centralized configuration for httprpc.
//!
//! Constant tables live on unit structs; `ServerOptions` carries the values a
//! host may override at runtime.

use std::time::Duration;

/// Wire-level protocol constants.
pub struct ProtocolConfig;

impl ProtocolConfig {
    pub const CONTENT_TYPE: &'static str = "application/json";
    pub const STATUS_OK: u16 = 200;
    pub const STATUS_ERROR: u16 = 500;
}

/// Server defaults.
pub struct ServerConfig;

impl ServerConfig {
    pub const DEFAULT_NAME: &'static str = "httprpc";
    pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);
    pub const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024; // 2MB
}

/// Runtime server options.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// How long `shutdown` waits for in-flight exchanges before forcing.
    pub shutdown_grace: Duration,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            shutdown_grace: ServerConfig::SHUTDOWN_GRACE_PERIOD,
            max_body_bytes: ServerConfig::MAX_REQUEST_BODY_BYTES,
        }
    }
}

impl ServerOptions {
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}
