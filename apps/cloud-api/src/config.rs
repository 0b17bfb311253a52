//! Cloud API configuration module.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults.

use serde::{Deserialize, Serialize};
use std::env;

/// Cloud API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server port
    pub http_port: u16,

    /// SQLite connection string
    pub database_url: String,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = ServerConfig {
            http_port: env::var("VELA_HTTP_PORT")
                .unwrap_or_else(|_| "8787".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("VELA_HTTP_PORT".to_string()))?,

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://vela-cloud.db?mode=rwc".to_string()),
        };

        Ok(config)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        // Only read here; setting env vars would leak across parallel tests.
        let config = ServerConfig::load().unwrap();
        assert!(config.http_port > 0);
        assert!(!config.database_url.is_empty());
    }
}
