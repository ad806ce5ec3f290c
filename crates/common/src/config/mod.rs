//! Configuration management for PUP STAR services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Record store configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Blob store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Record lifecycle configuration
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Listing/query configuration
    #[serde(default)]
    pub listing: ListingConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Orphan sweep configuration
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Largest accepted PDF upload in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Header carrying the per-request id, set when absent and echoed back
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
}

/// Which record store implementation to use
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Record store implementation
    #[serde(default = "default_database_driver")]
    pub driver: DatabaseDriver,

    /// Database URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply embedded migrations on startup
    #[serde(default = "default_enabled")]
    pub run_migrations: bool,
}

/// Which blob store implementation to use
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriver {
    Supabase,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Blob store implementation
    #[serde(default = "default_storage_driver")]
    pub driver: StorageDriver,

    /// Project base URL, e.g. https://xyz.supabase.co
    #[serde(default = "default_storage_base_url")]
    pub base_url: String,

    /// Public bucket holding the PDFs
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Service role key used for uploads and deletes
    pub service_key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_storage_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LifecycleConfig {
    /// Upper bound for every individual store call, in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListingConfig {
    /// Records per page on the browse pages
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum number of search-box suggestions
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT secret for token signing
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,

    /// Admin account created on first start when none exists
    pub bootstrap_username: Option<String>,
    pub bootstrap_password: Option<String>,
    pub bootstrap_security_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Serve Prometheus metrics at /metrics
    #[serde(default = "default_enabled")]
    pub metrics_enabled: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second on the auth endpoints
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SweeperConfig {
    /// Unreferenced blobs younger than this are left alone
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,

    /// Concurrent blob removals
    #[serde(default = "default_sweep_concurrency")]
    pub concurrency: usize,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_concurrent() -> usize { 100 }
fn default_max_upload_bytes() -> usize { 20 * 1024 * 1024 }
fn default_database_driver() -> DatabaseDriver { DatabaseDriver::Postgres }
fn default_database_url() -> String { "postgres://localhost/pupstar".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_storage_driver() -> StorageDriver { StorageDriver::Supabase }
fn default_storage_base_url() -> String { "http://localhost:54321".to_string() }
fn default_bucket() -> String { "papers".to_string() }
fn default_storage_timeout() -> u64 { 30 }
fn default_call_timeout() -> u64 { 10 }
fn default_page_size() -> usize { 4 }
fn default_suggestion_limit() -> usize { 10 }
fn default_jwt_expiration() -> u64 { 3600 }
fn default_request_id_header() -> String { "X-Request-ID".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "pupstar".to_string() }
fn default_rate_limit() -> u32 { 5 }
fn default_burst() -> u32 { 10 }
fn default_grace_period() -> u64 { 3600 }
fn default_sweep_concurrency() -> usize { 4 }
fn default_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_concurrent_requests: default_max_concurrent(),
            max_upload_bytes: default_max_upload_bytes(),
            request_id_header: default_request_id_header(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: default_database_driver(),
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: default_enabled(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: default_storage_driver(),
            base_url: default_storage_base_url(),
            bucket: default_bucket(),
            service_key: None,
            request_timeout_secs: default_storage_timeout(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { call_timeout_secs: default_call_timeout() }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            suggestion_limit: default_suggestion_limit(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expiration_secs: default_jwt_expiration(),
            bootstrap_username: None,
            bootstrap_password: None,
            bootstrap_security_code: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_enabled(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period(),
            concurrency: default_sweep_concurrency(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__STORAGE__BUCKET=papers
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// A fully in-memory configuration for local development and tests
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.database.driver = DatabaseDriver::Memory;
        config.storage.driver = StorageDriver::Memory;
        config
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Per-call bound applied by the record lifecycle manager
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.lifecycle.call_timeout_secs)
    }

    /// Grace period before an unreferenced blob may be swept
    pub fn sweep_grace_period(&self) -> Duration {
        Duration::from_secs(self.sweeper.grace_period_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            lifecycle: LifecycleConfig::default(),
            listing: ListingConfig::default(),
            auth: AuthConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
            sweeper: SweeperConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.bucket, "papers");
        assert_eq!(config.listing.page_size, 4);
        assert_eq!(config.call_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_in_memory_config() {
        let config = AppConfig::in_memory();
        assert_eq!(config.database.driver, DatabaseDriver::Memory);
        assert_eq!(config.storage.driver, StorageDriver::Memory);
    }

    #[test]
    fn test_partial_sources_fill_defaults() {
        let config: AppConfig = Config::builder()
            .set_override("listing.page_size", 12)
            .unwrap()
            .set_override("storage.driver", "memory")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.listing.page_size, 12);
        assert_eq!(config.listing.suggestion_limit, 10);
        assert_eq!(config.storage.driver, StorageDriver::Memory);
        assert_eq!(config.database.driver, DatabaseDriver::Postgres);
    }

    #[test]
    fn test_request_id_header_is_a_server_setting() {
        assert_eq!(AppConfig::default().server.request_id_header, "X-Request-ID");

        let config: AppConfig = Config::builder()
            .set_override("server.request_id_header", "X-Correlation-ID")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.server.request_id_header, "X-Correlation-ID");
        assert_eq!(config.server.port, 8080);
    }
}
