//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use cardroom::session::RegistryConfig;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

const DEFAULT_BIND: &str = "127.0.0.1:6969";
const DEFAULT_ARCHIVE_PATH: &str = "data/games.jsonl";

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// File finished sessions are appended to
    pub archive_path: PathBuf,
    /// How long running games may continue after a shutdown signal
    pub drain_timeout_secs: u64,
    /// Messages queued per WebSocket before the connection is dropped
    pub outbound_capacity: usize,
    /// Session registry tuning
    pub registry: RegistryConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `archive_override` - Optional archive path override (from CLI args)
    ///
    /// # Returns
    ///
    /// * `Result<ServerConfig, ConfigError>` - Loaded configuration or error
    ///
    /// # Errors
    ///
    /// Returns error if `SERVER_BIND` is set but is not a socket address
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        archive_override: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => {
                let raw = std::env::var("SERVER_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
                raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "SERVER_BIND".to_string(),
                    reason: format!("'{raw}' is not an IP:PORT address"),
                })?
            }
        };

        let archive_path = archive_override
            .or_else(|| std::env::var("ARCHIVE_PATH").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_PATH));

        let defaults = RegistryConfig::default();
        let registry = RegistryConfig {
            submit_timeout_ms: parse_env_or("SUBMIT_TIMEOUT_MS", defaults.submit_timeout_ms),
            tick_interval_ms: parse_env_or("TICK_INTERVAL_MS", defaults.tick_interval_ms),
            retention_secs: parse_env_or("SESSION_RETENTION_SECS", defaults.retention_secs),
            inbox_capacity: parse_env_or("SESSION_INBOX_CAPACITY", defaults.inbox_capacity),
            max_sessions: parse_env_or("MAX_SESSIONS", defaults.max_sessions),
        };

        Ok(ServerConfig {
            bind,
            archive_path,
            drain_timeout_secs: parse_env_or("DRAIN_TIMEOUT_SECS", 30),
            outbound_capacity: parse_env_or("WS_OUTBOUND_CAPACITY", 256),
            registry,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "WS_OUTBOUND_CAPACITY".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.archive_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                var: "ARCHIVE_PATH".to_string(),
                reason: "Must not be empty".to_string(),
            });
        }

        self.registry
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "registry".to_string(),
                reason,
            })
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:8080".parse().unwrap(),
            archive_path: PathBuf::from("games.jsonl"),
            drain_timeout_secs: 30,
            outbound_capacity: 16,
            registry: RegistryConfig::default(),
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid {
            var: "SERVER_BIND".to_string(),
            reason: "not an address".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("SERVER_BIND"));
        assert!(msg.contains("not an address"));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let bind: SocketAddr = "0.0.0.0:7000".parse().unwrap();
        let config = ServerConfig::from_env(Some(bind), Some(PathBuf::from("/tmp/x.jsonl"))).unwrap();

        assert_eq!(config.bind, bind);
        assert_eq!(config.archive_path, PathBuf::from("/tmp/x.jsonl"));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_outbound_zero() {
        let config = ServerConfig {
            outbound_capacity: 0, // Invalid
            ..config()
        };

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var, .. } if var == "WS_OUTBOUND_CAPACITY"));
    }

    #[test]
    fn test_config_validation_registry_rejected() {
        let config = ServerConfig {
            registry: RegistryConfig {
                tick_interval_ms: 0, // Invalid
                ..RegistryConfig::default()
            },
            ..config()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Tick interval"));
    }

    #[test]
    fn test_drain_timeout() {
        assert_eq!(config().drain_timeout(), Duration::from_secs(30));
    }
}
