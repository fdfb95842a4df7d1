//! In-process order cache.
//!
//! A concurrent `order_uid -> Order` map built on `moka`. Entries are never
//! overwritten, evicted, or expired: an order stays cached until the process
//! exits, so memory grows with every ingested order.

use std::sync::Arc;

use moka::future::Cache;
use thiserror::Error;

use orderstream_core::Order;

/// Errors raised by [`OrderCache`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache already holds an order with this `order_uid`.
    #[error("order {0} is already cached")]
    AlreadyExists(String),
}

/// Insert-if-absent order cache.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct OrderCache {
    orders: Cache<String, Arc<Order>>,
}

impl OrderCache {
    /// Create an empty, unbounded cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            orders: Cache::builder().name("orders").build(),
        }
    }

    /// Look up a cached order.
    pub async fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.orders.get(order_uid).await
    }

    /// Cache an order unless its `order_uid` is already present.
    ///
    /// Concurrent saves of the same `order_uid` resolve to exactly one winner.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::AlreadyExists` if the key is taken; the existing
    /// entry is left untouched.
    pub async fn save(&self, order: Arc<Order>) -> Result<(), CacheError> {
        let entry = self
            .orders
            .entry_by_ref(order.order_uid.as_str())
            .or_insert_with(async { Arc::clone(&order) })
            .await;

        if entry.is_fresh() {
            Ok(())
        } else {
            Err(CacheError::AlreadyExists(order.order_uid.clone()))
        }
    }
}

impl Default for OrderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OrderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderCache")
            .field("entries", &self.orders.entry_count())
            .finish()
    }
}
