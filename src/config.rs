//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup; there is no runtime reconfiguration.

use std::env;
use std::time::Duration;

/// Default seconds between publish cycles while a trip is active.
const DEFAULT_PUBLISH_INTERVAL_SECS: u64 = 10;
/// Default bound on waiting for a position fix.
const DEFAULT_GEOLOCATION_TIMEOUT_SECS: u64 = 10;

/// Which directory store backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Google Cloud Firestore (production; emulator via FIRESTORE_EMULATOR_HOST)
    Firestore,
    /// In-process volatile store (local development and tests)
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Directory store backend
    pub store_backend: StoreBackend,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Interval between location publish cycles
    pub publish_interval: Duration,
    /// Bounded wait for a geolocation sample
    pub geolocation_timeout: Duration,
    /// Use the random-walk simulator instead of device-reported positions
    pub simulate_geolocation: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Err(_) | Ok("firestore") => StoreBackend::Firestore,
            Ok("memory") => StoreBackend::Memory,
            Ok(other) => return Err(ConfigError::Invalid("STORE_BACKEND", other.to_string())),
        };

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            store_backend,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            publish_interval: Duration::from_secs(parse_secs(
                "PUBLISH_INTERVAL_SECS",
                DEFAULT_PUBLISH_INTERVAL_SECS,
            )?),
            geolocation_timeout: Duration::from_secs(parse_secs(
                "GEOLOCATION_TIMEOUT_SECS",
                DEFAULT_GEOLOCATION_TIMEOUT_SECS,
            )?),
            simulate_geolocation: env::var("SIMULATE_GEOLOCATION")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            store_backend: StoreBackend::Memory,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            publish_interval: Duration::from_millis(50),
            geolocation_timeout: Duration::from_millis(100),
            simulate_geolocation: false,
        }
    }
}

fn parse_secs(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::Invalid(var, raw)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test: env mutations are process-wide and must not interleave.
    #[test]
    fn test_config_from_env() {
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::remove_var("PUBLISH_INTERVAL_SECS");
        env::remove_var("GEOLOCATION_TIMEOUT_SECS");
        env::remove_var("STORE_BACKEND");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.port, 8080);
        assert_eq!(config.store_backend, StoreBackend::Firestore);
        assert_eq!(config.publish_interval, Duration::from_secs(10));
        assert_eq!(config.geolocation_timeout, Duration::from_secs(10));
        assert!(!config.simulate_geolocation);

        env::set_var("PUBLISH_INTERVAL_SECS", "0");
        let err = Config::from_env().expect_err("zero interval must be rejected");
        assert!(matches!(
            err,
            ConfigError::Invalid("PUBLISH_INTERVAL_SECS", _)
        ));
        env::remove_var("PUBLISH_INTERVAL_SECS");
    }
}
