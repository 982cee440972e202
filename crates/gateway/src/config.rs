//! Gateway configuration loaded from environment variables.

use std::time::Duration;

use resilience::RetryPolicy;

/// Gateway configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `8080`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `AUTH_SERVICE_URL`: base URL of the authentication service
/// - `PRODUCT_SERVICE_HTTP_ADDR`: base URL of the product service's HTTP API
/// - `CACHE_TTL_SECONDS`: response cache expiration (default: `30`)
/// - `RATE_LIMIT_RPS`: sustained requests per second (default: `10`)
/// - `RATE_LIMIT_BURST`: token bucket size (default: `20`)
/// - `RETRY_ATTEMPTS`, `RETRY_DELAY_MS`: outbound retry policy (default: `3`, `200`)
/// - `HTTP_CLIENT_TIMEOUT_MS`: per-call timeout of HTTP clients (default: `5000`)
/// - `REQUEST_TIMEOUT_MS`: deadline of one inbound request (default: `10000`)
/// - `SHUTDOWN_TIMEOUT_SECONDS`: graceful shutdown grace period (default: `5`)
///
/// Unparseable values fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub auth_service_url: String,
    pub product_service_url: String,
    pub cache_ttl: Duration,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: u32,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub http_client_timeout: Duration,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            auth_service_url: std::env::var("AUTH_SERVICE_URL")
                .unwrap_or(defaults.auth_service_url),
            product_service_url: std::env::var("PRODUCT_SERVICE_HTTP_ADDR")
                .unwrap_or(defaults.product_service_url),
            cache_ttl: Duration::from_secs(env_or("CACHE_TTL_SECONDS", 30)),
            rate_limit_rps: env_or("RATE_LIMIT_RPS", defaults.rate_limit_rps),
            rate_limit_burst: env_or("RATE_LIMIT_BURST", defaults.rate_limit_burst),
            retry_attempts: env_or("RETRY_ATTEMPTS", defaults.retry_attempts),
            retry_delay: Duration::from_millis(env_or("RETRY_DELAY_MS", 200)),
            http_client_timeout: Duration::from_millis(env_or("HTTP_CLIENT_TIMEOUT_MS", 5000)),
            request_timeout: Duration::from_millis(env_or("REQUEST_TIMEOUT_MS", 10_000)),
            shutdown_timeout: Duration::from_secs(env_or("SHUTDOWN_TIMEOUT_SECONDS", 5)),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The retry policy shared by outbound calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_delay)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            auth_service_url: "http://localhost:8081".to_string(),
            product_service_url: "http://localhost:8082".to_string(),
            cache_ttl: Duration::from_secs(30),
            rate_limit_rps: 10.0,
            rate_limit_burst: 20,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(200),
            http_client_timeout: Duration::from_millis(5000),
            request_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}
