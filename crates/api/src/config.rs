//! Process configuration read from the environment.
//!
//! | variable                   | default          |
//! |----------------------------|------------------|
//! | `BIND_ADDR`                | `0.0.0.0:8080`   |
//! | `JWT_SECRET`               | dev secret (warns) |
//! | `USE_PERSISTENT_STORES`    | `false`          |
//! | `DATABASE_URL`             | required when persistent |
//! | `DATABASE_MAX_CONNECTIONS` | `10`             |
//! | `LOG_FORMAT`               | `json`           |

use std::net::SocketAddr;

use thiserror::Error;

use retailops_observability::{LogFormat, ParseLogFormatError};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_ADDR {value:?} is not a socket address")]
    InvalidBindAddr { value: String },

    #[error("{var} must be a boolean, got {value:?}")]
    InvalidBool { var: &'static str, value: String },

    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("DATABASE_URL is required when USE_PERSISTENT_STORES is enabled")]
    MissingDatabaseUrl,

    #[error("LOG_FORMAT: {0}")]
    InvalidLogFormat(#[from] ParseLogFormatError),
}

/// Postgres settings, present only when persistent stores are enabled.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl core::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub database: Option<DatabaseConfig>,
    pub log_format: LogFormat,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"<redacted>")
            .field("database", &self.database)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr { value: bind_addr.clone() })?;

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let persistent = match var("USE_PERSISTENT_STORES") {
            None => false,
            Some(v) => parse_bool(&v).ok_or(ConfigError::InvalidBool {
                var: "USE_PERSISTENT_STORES",
                value: v,
            })?,
        };

        let database = if persistent {
            let url = var("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;
            let max_connections = match var("DATABASE_MAX_CONNECTIONS") {
                None => 10,
                Some(v) => v
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or(ConfigError::InvalidNumber { var: "DATABASE_MAX_CONNECTIONS", value: v })?,
            };
            Some(DatabaseConfig { url, max_connections })
        } else {
            None
        };

        let log_format = match var("LOG_FORMAT") {
            None => LogFormat::default(),
            Some(v) => v.parse()?,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            database,
            log_format,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_are_in_memory_json_on_8080() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert!(cfg.database.is_none());
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn persistent_mode_requires_a_database_url() {
        assert!(matches!(
            config(&[("USE_PERSISTENT_STORES", "true")]),
            Err(ConfigError::MissingDatabaseUrl)
        ));

        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "yes"),
            ("DATABASE_URL", "postgres://localhost/retail"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
        ])
        .unwrap();
        assert_eq!(cfg.database.unwrap().max_connections, 4);
    }

    #[test]
    fn invalid_values_are_reported() {
        assert!(matches!(config(&[("BIND_ADDR", "nope")]), Err(ConfigError::InvalidBindAddr { .. })));
        assert!(matches!(
            config(&[("USE_PERSISTENT_STORES", "maybe")]),
            Err(ConfigError::InvalidBool { .. })
        ));
        assert!(matches!(config(&[("LOG_FORMAT", "xml")]), Err(ConfigError::InvalidLogFormat(_))));
    }

    #[test]
    fn secrets_are_not_debug_printed() {
        let cfg = config(&[("JWT_SECRET", "s3cr3t")]).unwrap();
        assert!(!format!("{cfg:?}").contains("s3cr3t"));
    }
}
