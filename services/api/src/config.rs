//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// Upper bound for the session timeouts, one year.
const MAX_SESSION_SECS: i64 = 365 * 24 * 60 * 60;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: Level,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub session_idle_timeout_secs: i64,
    pub session_max_lifetime_secs: i64,
    pub login_path: String,
    pub forbidden_path: String,
    pub cookie_secure: bool,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", &var_or("BIND_ADDRESS", "0.0.0.0:3000"))?;
        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let db_max_connections = parse_var("DB_MAX_CONNECTIONS", &var_or("DB_MAX_CONNECTIONS", "5"))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Uploads ---
        let upload_dir = PathBuf::from(var_or("UPLOAD_DIR", "./uploads"));
        let max_upload_bytes =
            parse_var("MAX_UPLOAD_BYTES", &var_or("MAX_UPLOAD_BYTES", "10485760"))?;

        // --- Sessions and Access Control ---
        let session_idle_timeout_secs = parse_session_secs(
            "SESSION_IDLE_TIMEOUT_SECS",
            &var_or("SESSION_IDLE_TIMEOUT_SECS", "1800"),
        )?;
        let session_max_lifetime_secs = parse_session_secs(
            "SESSION_MAX_LIFETIME_SECS",
            &var_or("SESSION_MAX_LIFETIME_SECS", "43200"),
        )?;
        let login_path = var_or("LOGIN_PATH", "/login");
        let forbidden_path = var_or("FORBIDDEN_PATH", "/forbidden");
        let cookie_secure = parse_var("COOKIE_SECURE", &var_or("COOKIE_SECURE", "true"))?;
        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            log_level,
            upload_dir,
            max_upload_bytes,
            session_idle_timeout_secs,
            session_max_lifetime_secs,
            login_path,
            forbidden_path,
            cookie_secure,
            cors_origin,
        })
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

fn parse_session_secs(key: &str, value: &str) -> Result<i64, ConfigError> {
    let parsed: i64 = parse_var(key, value)?;
    if parsed <= 0 || parsed > MAX_SESSION_SECS {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must be between 1 and {} seconds", MAX_SESSION_SECS),
        ));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/crm")]))
            .unwrap();

        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.session_idle_timeout_secs, 1800);
        assert_eq!(config.login_path, "/login");
        assert_eq!(config.forbidden_path, "/forbidden");
        assert!(config.cookie_secure);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ConfigError::MissingVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn rejects_non_positive_idle_timeout() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/crm"),
            ("SESSION_IDLE_TIMEOUT_SECS", "0"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(k, _)) if k == "SESSION_IDLE_TIMEOUT_SECS"));
    }

    #[test]
    fn rejects_session_lifetime_beyond_one_year() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/crm"),
            ("SESSION_MAX_LIFETIME_SECS", "9000000000000"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(k, _)) if k == "SESSION_MAX_LIFETIME_SECS"));

        let at_cap = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/crm"),
            ("SESSION_MAX_LIFETIME_SECS", "31536000"),
        ]))
        .unwrap();
        assert_eq!(at_cap.session_max_lifetime_secs, MAX_SESSION_SECS);
    }

    #[test]
    fn rejects_unknown_log_level() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/crm"),
            ("RUST_LOG", "chatty"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(k, _)) if k == "RUST_LOG"));
    }
}
