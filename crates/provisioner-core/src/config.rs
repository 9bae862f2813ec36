// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

/// Provisioner persistence configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// Maximum connections held by the pool
    pub max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `PROVISIONER_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `PROVISIONER_DB_MAX_CONNECTIONS`: Pool size (default: 5)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("PROVISIONER_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("PROVISIONER_DATABASE_URL"))?;

        let max_connections: u32 = std::env::var("PROVISIONER_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "PROVISIONER_DB_MAX_CONNECTIONS",
                    "must be a positive integer",
                )
            })?;

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PROVISIONER_DATABASE_URL", "postgres://localhost/test");
        guard.remove("PROVISIONER_DB_MAX_CONNECTIONS");

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "postgres://localhost/test");
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set(
            "PROVISIONER_DATABASE_URL",
            "postgres://user:pass@db:5432/prod",
        );
        guard.set("PROVISIONER_DB_MAX_CONNECTIONS", "20");

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "postgres://user:pass@db:5432/prod");
        assert_eq!(config.max_connections, 20);
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("PROVISIONER_DATABASE_URL");

        let result = Config::from_env();
        assert!(result.is_err());

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing("PROVISIONER_DATABASE_URL")
        ));
        assert!(err.to_string().contains("PROVISIONER_DATABASE_URL"));
    }

    #[test]
    fn test_config_invalid_max_connections() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PROVISIONER_DATABASE_URL", "sqlite:test.db");
        guard.set("PROVISIONER_DB_MAX_CONNECTIONS", "abc");

        let result = Config::from_env();
        assert!(result.is_err());

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("PROVISIONER_DB_MAX_CONNECTIONS", _)
        ));
    }

    #[test]
    fn test_config_negative_max_connections() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PROVISIONER_DATABASE_URL", "sqlite:test.db");
        guard.set("PROVISIONER_DB_MAX_CONNECTIONS", "-5");

        let result = Config::from_env();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_error_display() {
        let missing = ConfigError::Missing("MY_VAR");
        assert_eq!(
            missing.to_string(),
            "missing required environment variable: MY_VAR"
        );

        let invalid = ConfigError::Invalid("MY_VAR", "must be a number");
        assert_eq!(
            invalid.to_string(),
            "invalid value for MY_VAR: must be a number"
        );
    }
}
