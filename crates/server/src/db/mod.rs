//! Durable order persistence in `PostgreSQL`.
//!
//! # Database: `wb_database`
//!
//! ## Tables
//!
//! - `orders` - Order header, keyed by `order_uid`
//! - `deliveries` - Delivery details, 1:1 with `orders`
//! - `payments` - Payment details, 1:1 with `orders`
//! - `items` - Line items, content-addressed by `chrt_id` (first writer wins)
//! - `order_items` - Which `chrt_id`s belong to which order
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/`, embedded in
//! [`MIGRATOR`], and run via:
//! ```bash
//! cargo run -p orderstream-cli -- migrate
//! ```

pub mod orders;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use orderstream_core::Order;

use crate::config::{ConfigError, DatabaseConfig};

pub use orders::PgOrderStore;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors raised by an [`OrderStore`].
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No order header exists for this `order_uid`.
    #[error("order {0} not found")]
    NotFound(String),

    /// An order with this `order_uid` was already committed.
    #[error("order {0} already exists")]
    AlreadyExists(String),

    /// Connectivity, query, decode, or transaction failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store is configured but cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors creating the pool or applying migrations.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Canonical storage for order aggregates.
///
/// Orders are inserted once and never updated or deleted.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fetch one order with its delivery, payment, and items.
    async fn get_order(&self, order_uid: &str) -> Result<Order, RepositoryError>;

    /// Persist a whole aggregate atomically.
    ///
    /// Fails with `RepositoryError::AlreadyExists` if the `order_uid` is
    /// already stored; nothing is written in that case.
    async fn save_order(&self, order: &Order) -> Result<(), RepositoryError>;

    /// Up to `limit` orders, most recently created first, items attached.
    async fn get_recent_orders(&self, limit: usize) -> Result<Vec<Order>, RepositoryError>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `SetupError` if the connection options are invalid or the
/// connection cannot be established.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, SetupError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(config.connect_options()?)
        .await?;
    Ok(pool)
}

/// Apply all pending migrations.
///
/// # Errors
///
/// Returns `SetupError::Migration` if a migration fails or the recorded
/// history diverges from the embedded files.
pub async fn run_migrations(pool: &PgPool) -> Result<(), SetupError> {
    MIGRATOR.run(pool).await?;
    Ok(())
}
