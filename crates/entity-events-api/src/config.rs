//! Server configuration read from the environment.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use entity_events_engine::EngineConfig;

use crate::error::AppError;

/// Settings of the API server and its engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Address the server binds to.
    pub host: String,
    /// Port the server binds to.
    pub port: u16,
    /// Engine settings; the instance id tags published events.
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when `DATABASE_URL` is missing or a value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when `DATABASE_URL` is missing or a value
    /// cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable must be set".to_string())
        })?;
        let defaults = EngineConfig::default();

        let engine = EngineConfig {
            instance_id: lookup("ENTITY_EVENTS_INSTANCE_ID").unwrap_or(defaults.instance_id),
            batch_size: parse(&lookup, "ENTITY_EVENTS_BATCH_SIZE", defaults.batch_size)?,
            poll_interval: Duration::from_millis(parse(
                &lookup,
                "ENTITY_EVENTS_POLL_INTERVAL_MS",
                u64::try_from(defaults.poll_interval.as_millis()).unwrap_or(u64::MAX),
            )?),
            asynchronous: parse(&lookup, "ENTITY_EVENTS_ASYNCHRONOUS", defaults.asynchronous)?,
            retain_executed: parse(
                &lookup,
                "ENTITY_EVENTS_RETAIN_EXECUTED",
                defaults.retain_executed,
            )?,
        };
        if engine.instance_id.trim().is_empty() {
            return Err(AppError::Config(
                "ENTITY_EVENTS_INSTANCE_ID must not be empty".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(&lookup, "PORT", 3000)?,
            engine,
        })
    }

    /// Address the server binds to.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an invalid host.
    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_only_database_url_is_set() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/events")]).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_engine_settings_are_read() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/events"),
            ("ENTITY_EVENTS_INSTANCE_ID", "node-b"),
            ("ENTITY_EVENTS_BATCH_SIZE", "40"),
            ("ENTITY_EVENTS_POLL_INTERVAL_MS", "250"),
            ("ENTITY_EVENTS_ASYNCHRONOUS", "false"),
            ("ENTITY_EVENTS_RETAIN_EXECUTED", "true"),
        ])
        .unwrap();

        assert_eq!(config.engine.instance_id, "node-b");
        assert_eq!(config.engine.batch_size, 40);
        assert_eq!(config.engine.poll_interval, Duration::from_millis(250));
        assert!(!config.engine.asynchronous);
        assert!(config.engine.retain_executed);
    }

    #[test]
    fn test_missing_database_url_is_a_config_error() {
        assert!(matches!(config_from(&[]), Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let result = config_from(&[
            ("DATABASE_URL", "postgres://localhost/events"),
            ("PORT", "http"),
        ]);
        assert!(matches!(result, Err(AppError::Config(m)) if m.contains("PORT")));

        let result = config_from(&[
            ("DATABASE_URL", "postgres://localhost/events"),
            ("ENTITY_EVENTS_INSTANCE_ID", " "),
        ]);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_socket_addr() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/events"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
        ])
        .unwrap();

        assert_eq!(config.socket_addr().unwrap().port(), 8080);
    }
}
