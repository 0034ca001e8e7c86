//! Application configuration loaded from environment variables.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Configuration for the object-store backend (S3-compatible, minio-friendly).
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub object_store: ObjectStoreConfig,
    pub registry_path: String,
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub query_row_threshold: usize,
    pub app_host: String,
    pub app_port: u16,
    pub shutdown_grace: Duration,
    pub cors_origins: String,
    pub cors_methods: String,
    pub cors_headers: String,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// defaults in SPEC_FULL.md §6. Loads a `.env` file if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let max_workers: usize = env_or("FLIGHT_MAX_WORKERS", "4")
            .parse()
            .context("FLIGHT_MAX_WORKERS must be a valid number")?;
        let queue_capacity: usize = env_or("FLIGHT_QUEUE_CAPACITY", "64")
            .parse()
            .context("FLIGHT_QUEUE_CAPACITY must be a valid number")?;
        let query_row_threshold: usize = env_or("FLIGHT_QUERY_ROW_THRESHOLD", "10000")
            .parse()
            .context("FLIGHT_QUERY_ROW_THRESHOLD must be a valid number")?;
        let app_port: u16 = env_or("FLIGHT_APP_PORT", "8080")
            .parse()
            .context("FLIGHT_APP_PORT must be a valid number")?;
        let shutdown_grace_ms: u64 = env_or("FLIGHT_SHUTDOWN_GRACE_MS", "30000")
            .parse()
            .context("FLIGHT_SHUTDOWN_GRACE_MS must be a valid number")?;

        Ok(Self {
            object_store: ObjectStoreConfig {
                bucket: env_or("FLIGHT_S3_BUCKET", "flight-cache"),
                endpoint: env_or("FLIGHT_S3_ENDPOINT", "http://localhost:9000"),
                access_key: env_or("FLIGHT_S3_ACCESS_KEY", "minioadmin"),
                secret_key: env_or("FLIGHT_S3_SECRET_KEY", "minioadmin"),
                region: env_or("FLIGHT_S3_REGION", "us-east-1"),
            },
            registry_path: env_or("FLIGHT_REGISTRY_PATH", "job_registry.db"),
            max_workers,
            queue_capacity,
            query_row_threshold,
            app_host: env_or("FLIGHT_APP_HOST", "localhost"),
            app_port,
            shutdown_grace: Duration::from_millis(shutdown_grace_ms),
            cors_origins: env_or("FLIGHT_CORS_ORIGINS", "*"),
            cors_methods: env_or("FLIGHT_CORS_METHODS", "*"),
            cors_headers: env_or("FLIGHT_CORS_HEADERS", "*"),
        })
    }

    /// A deterministic configuration for tests, independent of the
    /// process environment.
    pub fn test_default() -> Self {
        Self {
            object_store: ObjectStoreConfig {
                bucket: "flight-cache".to_string(),
                endpoint: "http://localhost:9000".to_string(),
                access_key: "minioadmin".to_string(),
                secret_key: "minioadmin".to_string(),
                region: "us-east-1".to_string(),
            },
            registry_path: ":memory:".to_string(),
            max_workers: 2,
            queue_capacity: 16,
            query_row_threshold: 10_000,
            app_host: "localhost".to_string(),
            app_port: 8080,
            shutdown_grace: Duration::from_millis(1000),
            cors_origins: "*".to_string(),
            cors_methods: "*".to_string(),
            cors_headers: "*".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_to_default() {
        env::remove_var("FLIGHT_TEST_UNSET_VAR");
        assert_eq!(env_or("FLIGHT_TEST_UNSET_VAR", "fallback"), "fallback");
    }
}
