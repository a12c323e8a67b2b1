//! Relay settings, read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `HOST` | `0.0.0.0` |
//! | `PORT` | `3000` |
//! | `DATABASE_URL` | required |
//! | `DATABASE_MAX_CONNECTIONS` | `10` |
//! | `MAX_SNAPSHOT_BYTES` | 16 MiB |
//! | `AUTH_SECRET` | unset: any bearer token is accepted |

use std::{env, str::FromStr};

/// Snapshots are sent whole, so the body limit sits well above axum's default.
pub const DEFAULT_MAX_SNAPSHOT_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_MAX_DB_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Upper bound of the Postgres pool shared by every store.
    pub max_db_connections: u32,
    /// Largest accepted request body; one snapshot or document per request.
    pub max_snapshot_bytes: usize,
    /// Shared credential for the document endpoints.
    pub auth_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; unset and empty values are the same.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let max_db_connections: u32 = parse(&var, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_DB_CONNECTIONS)?;
        if max_db_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "DATABASE_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(&var, "PORT", 3000)?,
            database_url: var("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?,
            max_db_connections,
            max_snapshot_bytes: parse(&var, "MAX_SNAPSHOT_BYTES", DEFAULT_MAX_SNAPSHOT_BYTES)?,
            auth_secret: var("AUTH_SECRET"),
        })
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("invalid {name} value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_with_only_a_database() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/lounge")]).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert_eq!(config.max_db_connections, DEFAULT_MAX_DB_CONNECTIONS);
        assert_eq!(config.max_snapshot_bytes, DEFAULT_MAX_SNAPSHOT_BYTES);
        assert!(config.auth_secret.is_none());
    }

    #[test]
    fn empty_secret_is_unset() {
        let config = load(&[("DATABASE_URL", "postgres://x"), ("AUTH_SECRET", "")]).unwrap();
        assert!(config.auth_secret.is_none());
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingDatabaseUrl)));
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let err = load(&[("DATABASE_URL", "postgres://x"), ("PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));

        let err = load(&[
            ("DATABASE_URL", "postgres://x"),
            ("DATABASE_MAX_CONNECTIONS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "DATABASE_MAX_CONNECTIONS",
                ..
            }
        ));
    }
}
