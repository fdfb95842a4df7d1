//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! os-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string (takes precedence)
//! - `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_DATABASE` - used
//!   when `DATABASE_URL` is unset
//!
//! Migration files live in `crates/server/migrations/` and are embedded in
//! the server crate at build time.

use orderstream_server::config::{ConfigError, DatabaseConfig};
use orderstream_server::db::{self, SetupError};
use thiserror::Error;

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Setup(#[from] SetupError),
}

/// Apply all pending migrations to the order database.
///
/// # Errors
///
/// Returns `MigrationError` if the configuration is invalid, the database is
/// unreachable, or a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    let config = DatabaseConfig::from_env()?;

    tracing::info!(host = %config.host, database = %config.database, "Connecting to database...");
    let pool = db::create_pool(&config).await?;

    tracing::info!("Running migrations...");
    db::run_migrations(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
