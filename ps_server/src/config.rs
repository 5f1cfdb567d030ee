//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use poker_score::{db::DatabaseConfig, hub::HubConfig, room::LifecycleConfig};
use std::{fmt, net::SocketAddr, str::FromStr};

const DEFAULT_BIND: &str = "127.0.0.1:6969";

/// Which ledger store backs the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::Invalid {
                var: "STORE_BACKEND".to_string(),
                reason: format!("Unknown backend '{}', expected 'postgres' or 'memory'", other),
            }),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Postgres => write!(f, "postgres"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Ledger store backend
    pub store: StoreBackend,
    /// Database configuration, used by the postgres backend
    pub database: DatabaseConfig,
    /// Room inactivity and code settings
    pub lifecycle: LifecycleConfig,
    /// Room hub buffers
    pub hub: HubConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `store_override` - Optional store backend override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if `SERVER_BIND` or `STORE_BACKEND` is set but invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        store_override: Option<StoreBackend>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => match std::env::var("SERVER_BIND") {
                Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                    var: "SERVER_BIND".to_string(),
                    reason: format!("'{}' is not an IP:PORT address", value),
                })?,
                Err(_) => DEFAULT_BIND.parse().map_err(|_| ConfigError::Invalid {
                    var: "SERVER_BIND".to_string(),
                    reason: "Default bind address is invalid".to_string(),
                })?,
            },
        };

        let store = match store_override {
            Some(store) => store,
            None => match std::env::var("STORE_BACKEND") {
                Ok(value) => value.parse()?,
                Err(_) => StoreBackend::Postgres,
            },
        };

        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        Ok(ServerConfig {
            bind,
            store,
            database,
            lifecycle: LifecycleConfig::from_env(),
            hub: HubConfig::from_env(),
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store == StoreBackend::Postgres {
            if self.database.database_url.is_empty() {
                return Err(ConfigError::MissingRequired {
                    var: "DATABASE_URL".to_string(),
                    hint: "Set a postgres:// URL or run with --store memory".to_string(),
                });
            }

            if self.database.min_connections > self.database.max_connections {
                return Err(ConfigError::Invalid {
                    var: "DB_MIN_CONNECTIONS".to_string(),
                    reason: format!(
                        "Cannot exceed max connections ({})",
                        self.database.max_connections
                    ),
                });
            }
        }

        self.lifecycle
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "ROOM_INACTIVITY_HOURS".to_string(),
                reason,
            })?;

        if self.hub.connection_buffer == 0 {
            return Err(ConfigError::Invalid {
                var: "HUB_CONNECTION_BUFFER".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}
