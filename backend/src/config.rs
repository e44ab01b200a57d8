//! Runtime configuration.
//!
//! Values come from the environment (a `.env` file is loaded first when
//! present); command-line flags override them in the binary.

use std::time::Duration;

use crate::error::ConfigError;
use crate::import::DEFAULT_CONCURRENCY;
use crate::store::rest::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};
use crate::store::RestConfig;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_AUTH_CHECK_PATH: &str = "/auth/me/";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Server and client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    /// Admin backend root. Required unless `memory` is set.
    pub backend_url: Option<String>,
    pub auth_check_path: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub concurrency: usize,
    pub max_upload_bytes: usize,
    /// Serve against an in-process store instead of the backend.
    pub memory: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            backend_url: None,
            auth_check_path: DEFAULT_AUTH_CHECK_PATH.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            concurrency: DEFAULT_CONCURRENCY,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            memory: false,
        }
    }
}

impl AppConfig {
    /// Load from the process environment and `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            port: parse_var(&get, "BULKLOAD_PORT")?.unwrap_or(defaults.port),
            backend_url: get("BULKLOAD_BACKEND_URL"),
            auth_check_path: get("BULKLOAD_AUTH_CHECK_PATH").unwrap_or(defaults.auth_check_path),
            request_timeout: parse_var(&get, "BULKLOAD_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_retries: parse_var(&get, "BULKLOAD_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            concurrency: parse_var::<usize, _>(&get, "BULKLOAD_CONCURRENCY")?
                .map(|n| n.max(1))
                .unwrap_or(defaults.concurrency),
            max_upload_bytes: parse_var(&get, "BULKLOAD_MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
            memory: false,
        })
    }

    /// REST client settings, if a backend URL is configured.
    pub fn rest_config(&self) -> Result<RestConfig, ConfigError> {
        let base_url = self.backend_url.as_deref().ok_or(ConfigError::MissingBackendUrl)?;
        Ok(RestConfig::new(base_url)
            .with_auth_check_path(&self.auth_check_path)
            .with_timeout(self.request_timeout)
            .with_max_retries(self.max_retries))
    }
}

/// Bearer token for CLI imports (`BULKLOAD_TOKEN`).
pub fn token_from_env() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("BULKLOAD_TOKEN").ok().filter(|t| !t.trim().is_empty())
}

fn parse_var<T, G>(get: &G, var: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var: var.to_string(), value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BULKLOAD_PORT", "8080"),
            ("BULKLOAD_BACKEND_URL", "https://admin.example.org/api"),
            ("BULKLOAD_REQUEST_TIMEOUT_SECS", "5"),
            ("BULKLOAD_CONCURRENCY", "0"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.rest_config().unwrap().base_url, "https://admin.example.org/api");
    }

    #[test]
    fn test_invalid_value() {
        let err = AppConfig::from_lookup(lookup(&[("BULKLOAD_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "BULKLOAD_PORT"));
    }

    #[test]
    fn test_rest_config_requires_backend_url() {
        let config = AppConfig::default();
        assert!(matches!(config.rest_config(), Err(ConfigError::MissingBackendUrl)));
    }
}
