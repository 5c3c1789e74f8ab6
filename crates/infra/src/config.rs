//! Process configuration, read from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which storage backend to run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
        lock_timeout: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub storage: StorageConfig,
    /// Deadline for one storage-touching workflow call.
    pub operation_timeout: Duration,
    /// Optional JSON file of customers and products loaded at startup.
    pub seed_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = parse_or("SHOPFLOOR_BIND", &lookup, || {
            DEFAULT_BIND.parse().map_err(|e: std::net::AddrParseError| e.to_string())
        })?;

        let use_persistent = parse_or("USE_PERSISTENT_STORES", &lookup, || Ok(false))?;

        let storage = if use_persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let max_connections =
                parse_or("DATABASE_MAX_CONNECTIONS", &lookup, || Ok(DEFAULT_MAX_CONNECTIONS))?;
            if max_connections == 0 {
                return Err(ConfigError::Invalid {
                    key: "DATABASE_MAX_CONNECTIONS",
                    value: "0".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            let lock_timeout_ms =
                parse_or("STOCK_LOCK_TIMEOUT_MS", &lookup, || Ok(DEFAULT_LOCK_TIMEOUT_MS))?;
            StorageConfig::Postgres {
                database_url,
                max_connections,
                lock_timeout: Duration::from_millis(lock_timeout_ms),
            }
        } else {
            StorageConfig::InMemory
        };

        let operation_timeout_ms = parse_or("ORDER_OPERATION_TIMEOUT_MS", &lookup, || {
            Ok(DEFAULT_OPERATION_TIMEOUT_MS)
        })?;
        if operation_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "ORDER_OPERATION_TIMEOUT_MS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let seed_path = lookup("SEED_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            bind_addr,
            storage,
            operation_timeout: Duration::from_millis(operation_timeout_ms),
            seed_path,
        })
    }
}

fn parse_or<T, F, D>(key: &'static str, lookup: &F, default: D) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
    D: FnOnce() -> Result<T, String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            })
        }
        _ => default().map_err(|reason| ConfigError::Invalid {
            key,
            value: String::new(),
            reason,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_in_memory() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.storage, StorageConfig::InMemory);
        assert_eq!(cfg.operation_timeout, Duration::from_millis(5_000));
        assert_eq!(cfg.seed_path, None);
    }

    #[test]
    fn persistent_requires_database_url() {
        let err = config(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn persistent_reads_pool_and_lock_settings() {
        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("STOCK_LOCK_TIMEOUT_MS", "750"),
        ])
        .unwrap();
        assert_eq!(
            cfg.storage,
            StorageConfig::Postgres {
                database_url: "postgres://localhost/shop".to_string(),
                max_connections: 4,
                lock_timeout: Duration::from_millis(750),
            }
        );
    }

    #[test]
    fn malformed_values_are_errors_not_defaults() {
        let err = config(&[("ORDER_OPERATION_TIMEOUT_MS", "soon")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "ORDER_OPERATION_TIMEOUT_MS",
                ..
            }
        ));
        assert!(config(&[("USE_PERSISTENT_STORES", "yes")]).is_err());
    }
}
