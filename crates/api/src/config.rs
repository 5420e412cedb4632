//! Application configuration loaded from environment variables.

use std::time::Duration;

use ordering::{CustomerCheckPolicy, ExternalConfig};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`, `RUST_LOG`: bind address, listen port, tracing filter
/// - `DATABASE_URL`: PostgreSQL; in-memory storage when unset
/// - `REDIS_URL`: Redis for the cart cache and locks; in-memory when unset
/// - `STORE_SERVICE_URL`, `CUSTOMER_SERVICE_URL`: peer services
/// - `EXTERNAL_CONNECT_TIMEOUT_MS`, `EXTERNAL_READ_TIMEOUT_MS`
/// - `CART_TTL_SECS`
/// - `CUSTOMER_CHECK_POLICY`: `deny` or `allow`
/// - `PAYMENT_LOCK_WAIT_MS`, `PAYMENT_LOCK_LEASE_MS`
/// - `TRUSTED_SERVICE_NAME`: the only caller allowed to complete payments
/// - `KAFKA_BROKERS`, `PAYMENT_TOPIC`, `PAYMENT_MAX_ATTEMPTS`: payment events,
///   `kafka` builds only
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub store_service_url: String,
    pub customer_service_url: String,
    pub external_connect_timeout: Duration,
    pub external_read_timeout: Duration,
    pub cart_ttl: Duration,
    pub customer_check: CustomerCheckPolicy,
    pub payment_lock_wait: Duration,
    pub payment_lock_lease: Duration,
    pub trusted_service_name: String,
    pub kafka_brokers: Option<String>,
    pub payment_topic: String,
    /// Deliveries of one payment event before it is skipped.
    pub payment_max_attempts: u32,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn millis(name: &str, default: u64) -> Duration {
    Duration::from_millis(var(name).and_then(|v| v.parse().ok()).unwrap_or(default))
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: var("DATABASE_URL"),
            redis_url: var("REDIS_URL"),
            store_service_url: var("STORE_SERVICE_URL").unwrap_or(defaults.store_service_url),
            customer_service_url: var("CUSTOMER_SERVICE_URL")
                .unwrap_or(defaults.customer_service_url),
            external_connect_timeout: millis("EXTERNAL_CONNECT_TIMEOUT_MS", 2000),
            external_read_timeout: millis("EXTERNAL_READ_TIMEOUT_MS", 5000),
            cart_ttl: var("CART_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cart_ttl),
            customer_check: var("CUSTOMER_CHECK_POLICY")
                .and_then(|v| CustomerCheckPolicy::parse(&v))
                .unwrap_or(defaults.customer_check),
            payment_lock_wait: millis("PAYMENT_LOCK_WAIT_MS", 2000),
            payment_lock_lease: millis("PAYMENT_LOCK_LEASE_MS", 5000),
            trusted_service_name: var("TRUSTED_SERVICE_NAME")
                .unwrap_or(defaults.trusted_service_name),
            kafka_brokers: var("KAFKA_BROKERS"),
            payment_topic: var("PAYMENT_TOPIC").unwrap_or(defaults.payment_topic),
            payment_max_attempts: var("PAYMENT_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.payment_max_attempts),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn external(&self) -> ExternalConfig {
        ExternalConfig {
            store_service_url: self.store_service_url.clone(),
            customer_service_url: self.customer_service_url.clone(),
            connect_timeout: self.external_connect_timeout,
            read_timeout: self.external_read_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            redis_url: None,
            store_service_url: "http://localhost:8082".to_string(),
            customer_service_url: "http://localhost:8083".to_string(),
            external_connect_timeout: Duration::from_millis(2000),
            external_read_timeout: Duration::from_millis(5000),
            cart_ttl: ordering::cart::DEFAULT_CART_TTL,
            customer_check: CustomerCheckPolicy::DenyOnFailure,
            payment_lock_wait: Duration::from_millis(2000),
            payment_lock_lease: Duration::from_millis(5000),
            trusted_service_name: "payment-service".to_string(),
            kafka_brokers: None,
            payment_topic: "payment.created".to_string(),
            payment_max_attempts: 5,
        }
    }
}
