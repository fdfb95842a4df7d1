//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! Every variable is optional; defaults target a local development stack.
//!
//! ## Database
//! - `DATABASE_URL` - Full `PostgreSQL` connection string (overrides the parts below)
//! - `DB_HOST` - Database host (default: localhost)
//! - `DB_PORT` - Database port (default: 5432)
//! - `DB_USER` - Database user (default: postgres)
//! - `DB_PASSWORD` - Database password (default: postgres)
//! - `DB_DATABASE` - Database name (default: `wb_database`)
//!
//! ## Message stream
//! - `KAFKA_BROKERS` - Comma-separated bootstrap brokers (default: localhost:9092)
//! - `KAFKA_TOPIC` - Order topic (default: orders)
//! - `KAFKA_CONNECT_TIMEOUT_SECS` - How long broker requests keep retrying
//!   before giving up (default: 30)
//!
//! ## HTTP
//! - `HTTP_HOST` - Bind address (default: 0.0.0.0)
//! - `HTTP_PORT` - Listen port (default: 8000)
//! - `STATIC_DIR` - Directory holding `index.html` (default: crates/server/static)
//!
//! ## Cache
//! - `CACHE_WARMUP_LIMIT` - Most recent orders loaded at startup (default: 100)
//!
//! ## Observability
//! - `LOG_FORMAT` - `json` for structured output, anything else for text
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` connection settings
    pub database: DatabaseConfig,
    /// Kafka topic and brokers
    pub kafka: KafkaConfig,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Directory holding the landing page
    pub static_dir: PathBuf,
    /// Number of recent orders loaded into the cache at startup
    pub cache_warmup_limit: usize,
    /// Emit JSON logs instead of text
    pub json_logs: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// `PostgreSQL` connection settings.
///
/// Implements `Debug` manually to redact the password and URL.
#[derive(Clone)]
pub struct DatabaseConfig {
    /// Full connection string; takes precedence over the individual parts
    pub url: Option<SecretString>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub database: String,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

/// Kafka connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Bootstrap brokers (`host:port`)
    pub brokers: Vec<String>,
    /// Topic carrying order events
    pub topic: String,
    /// Retry deadline for connecting, resolving the partition, and each fetch
    pub connect_timeout: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(&env_lookup)
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparseable value.
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database = DatabaseConfig::from_lookup(lookup)?;
        let kafka = KafkaConfig::from_lookup(lookup)?;
        let host = parse_or_default(lookup, "HTTP_HOST", "0.0.0.0")?;
        let port = parse_or_default(lookup, "HTTP_PORT", "8000")?;
        let static_dir = PathBuf::from(get_or_default(lookup, "STATIC_DIR", "crates/server/static"));
        let cache_warmup_limit = parse_or_default(lookup, "CACHE_WARMUP_LIMIT", "100")?;
        let json_logs = lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));
        let sentry_sample_rate = parse_or_default(lookup, "SENTRY_SAMPLE_RATE", "1.0")?;
        let sentry_traces_sample_rate = parse_or_default(lookup, "SENTRY_TRACES_SAMPLE_RATE", "0.0")?;

        Ok(Self {
            database,
            kafka,
            host,
            port,
            static_dir,
            cache_warmup_limit,
            json_logs,
            sentry_dsn: lookup("SENTRY_DSN"),
            sentry_environment: lookup("SENTRY_ENVIRONMENT"),
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl DatabaseConfig {
    /// Load database settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `DB_PORT` is not a valid port.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(&env_lookup)
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            url: lookup("DATABASE_URL").map(SecretString::from),
            host: get_or_default(lookup, "DB_HOST", "localhost"),
            port: parse_or_default(lookup, "DB_PORT", "5432")?,
            user: get_or_default(lookup, "DB_USER", "postgres"),
            password: SecretString::from(get_or_default(lookup, "DB_PASSWORD", "postgres")),
            database: get_or_default(lookup, "DB_DATABASE", "wb_database"),
        })
    }

    /// Connection options for `sqlx`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `DATABASE_URL` is set but cannot be parsed.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url.expose_secret()).map_err(|e| {
                ConfigError::InvalidEnvVar("DATABASE_URL".to_string(), e.to_string())
            });
        }

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(self.password.expose_secret())
            .database(&self.database))
    }
}

impl KafkaConfig {
    /// Load Kafka settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `KAFKA_CONNECT_TIMEOUT_SECS` is not a whole
    /// number of seconds.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(&env_lookup)
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let brokers = get_or_default(lookup, "KAFKA_BROKERS", "localhost:9092")
            .split(',')
            .map(str::trim)
            .filter(|broker| !broker.is_empty())
            .map(String::from)
            .collect();

        let timeout_secs: u64 = parse_or_default(lookup, "KAFKA_CONNECT_TIMEOUT_SECS", "30")?;

        Ok(Self {
            brokers,
            topic: get_or_default(lookup, "KAFKA_TOPIC", "orders"),
            connect_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get a variable with a default value.
fn get_or_default(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

/// Parse a variable, falling back to a default literal.
fn parse_or_default<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_or_default(lookup, key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
