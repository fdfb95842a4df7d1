//! Order service.
//!
//! Ties the durable [`OrderStore`] to the in-process [`OrderCache`]:
//!
//! - Writes go to the store first and reach the cache only after commit.
//!   The two steps are not atomic; a cache failure after a successful
//!   commit still surfaces as an error even though the order is durable.
//! - Reads check the cache and fall through to the store on a miss. A
//!   store hit is returned as-is and is not written back into the cache.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument};

use orderstream_core::Order;

use crate::cache::{CacheError, OrderCache};
use crate::db::{OrderStore, RepositoryError};

/// Errors surfaced by [`OrderService`], unchanged from the layer that raised them.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ServiceError {
    /// The order is absent from both cache and store.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Repository(RepositoryError::NotFound(_)))
    }

    /// The order was already stored or already cached.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::Repository(RepositoryError::AlreadyExists(_))
                | Self::Cache(CacheError::AlreadyExists(_))
        )
    }
}

/// Orchestrates the order store and cache.
///
/// Cheap to clone; clones share the same store and cache.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    cache: OrderCache,
}

impl OrderService {
    /// Create a service over explicit store and cache instances.
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>, cache: OrderCache) -> Self {
        Self { store, cache }
    }

    /// The durable store.
    #[must_use]
    pub fn store(&self) -> &dyn OrderStore {
        self.store.as_ref()
    }

    /// The order cache.
    #[must_use]
    pub const fn cache(&self) -> &OrderCache {
        &self.cache
    }

    /// Seed the cache with up to `limit` of the most recently created orders.
    ///
    /// Returns the number of orders cached.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first store or cache error.
    #[instrument(skip(self))]
    pub async fn load_cache(&self, limit: usize) -> Result<usize, ServiceError> {
        let orders = self.store.get_recent_orders(limit).await?;
        let count = orders.len();

        for order in orders {
            self.cache.save(Arc::new(order)).await?;
        }

        info!(count, "Cache warmed from store");
        Ok(count)
    }

    /// Persist an order, then cache it.
    ///
    /// # Errors
    ///
    /// Returns the store error if the commit fails; nothing is cached then.
    /// Returns the cache error if the commit succeeded but caching failed,
    /// in which case the order is durable and the cache is stale.
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid))]
    pub async fn save_order(&self, order: Arc<Order>) -> Result<(), ServiceError> {
        self.store.save_order(&order).await?;
        self.cache.save(order).await?;
        debug!("Order persisted and cached");
        Ok(())
    }

    /// Look up an order, cache first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order is absent everywhere,
    /// or any other store error raised on a cache miss.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_uid: &str) -> Result<Arc<Order>, ServiceError> {
        if let Some(order) = self.cache.get(order_uid).await {
            debug!("Cache hit");
            return Ok(order);
        }

        debug!("Cache miss, reading from store");
        let order = self.store.get_order(order_uid).await?;
        Ok(Arc::new(order))
    }

    /// Cache an order that has already been persisted.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::AlreadyExists` if the order is already cached.
    pub async fn update_cache(&self, order: Arc<Order>) -> Result<(), ServiceError> {
        self.cache.save(order).await?;
        Ok(())
    }
}

impl std::fmt::Debug for OrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use orderstream_core::fixtures;

    use super::*;
    use crate::db::memory::MemoryOrderStore;

    fn service_with(store: &Arc<MemoryOrderStore>) -> OrderService {
        OrderService::new(Arc::clone(store) as Arc<dyn OrderStore>, OrderCache::new())
    }

    #[tokio::test]
    async fn test_save_order_writes_store_then_cache() {
        let store = Arc::new(MemoryOrderStore::new());
        let service = service_with(&store);
        let order = Arc::new(fixtures::order_with_items("A1", 0, vec![fixtures::item(100, 500)]));

        service.save_order(Arc::clone(&order)).await.unwrap();

        assert_eq!(store.get_order("A1").await.unwrap(), *order);
        assert!(service.cache().get("A1").await.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_save_reports_already_exists() {
        let store = Arc::new(MemoryOrderStore::new());
        let service = service_with(&store);

        service
            .save_order(Arc::new(fixtures::order("A1", 0)))
            .await
            .unwrap();

        let mut changed = fixtures::order("A1", 0);
        changed.track_number = "CHANGED".to_string();
        let err = service.save_order(Arc::new(changed)).await.unwrap_err();

        assert!(err.is_already_exists());
        assert!(matches!(
            err,
            ServiceError::Repository(RepositoryError::AlreadyExists(_))
        ));
        assert_eq!(
            store.get_order("A1").await.unwrap().track_number,
            "WBILMTESTTRACK"
        );
    }

    #[tokio::test]
    async fn test_failed_store_write_skips_cache() {
        let store = Arc::new(MemoryOrderStore::new());
        store.set_unavailable(true);
        let service = service_with(&store);

        let result = service.save_order(Arc::new(fixtures::order("A1", 0))).await;

        assert!(matches!(
            result,
            Err(ServiceError::Repository(RepositoryError::Unavailable(_)))
        ));
        assert!(service.cache().get("A1").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_failure_after_commit_is_reported() {
        let store = Arc::new(MemoryOrderStore::new());
        let service = service_with(&store);
        let order = Arc::new(fixtures::order("A1", 0));

        // Pre-seed the cache so the post-commit cache write collides.
        service.update_cache(Arc::clone(&order)).await.unwrap();
        let result = service.save_order(order).await;

        assert!(matches!(
            result,
            Err(ServiceError::Cache(CacheError::AlreadyExists(_)))
        ));
        assert_eq!(store.order_rows().await, 1);
    }

    #[tokio::test]
    async fn test_get_order_prefers_cache() {
        let store = Arc::new(MemoryOrderStore::new());
        let service = service_with(&store);

        // Only in the cache: the store has never seen it.
        service
            .update_cache(Arc::new(fixtures::order("C1", 0)))
            .await
            .unwrap();

        let order = service.get_order("C1").await.unwrap();
        assert_eq!(order.order_uid, "C1");
        assert_eq!(store.order_rows().await, 0);
    }

    #[tokio::test]
    async fn test_get_order_miss_is_not_written_back() {
        let store = Arc::new(MemoryOrderStore::new());
        let service = service_with(&store);
        let order = fixtures::order_with_items("S1", 0, vec![fixtures::item(7, 70)]);
        store.save_order(&order).await.unwrap();

        let fetched = service.get_order("S1").await.unwrap();

        assert_eq!(*fetched, order);
        assert!(service.cache().get("S1").await.is_none());
    }

    #[tokio::test]
    async fn test_get_order_not_found() {
        let store = Arc::new(MemoryOrderStore::new());
        let service = service_with(&store);

        let err = service.get_order("ZZZ").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_load_cache_takes_most_recent() {
        let store = Arc::new(MemoryOrderStore::new());
        for (i, uid) in ["O0", "O1", "O2", "O3", "O4"].iter().enumerate() {
            let offset = i64::try_from(i).unwrap() * 60;
            store.save_order(&fixtures::order(uid, offset)).await.unwrap();
        }
        let service = service_with(&store);

        let loaded = service.load_cache(3).await.unwrap();

        assert_eq!(loaded, 3);
        for uid in ["O2", "O3", "O4"] {
            assert!(service.cache().get(uid).await.is_some(), "{uid} should be cached");
        }
        for uid in ["O0", "O1"] {
            assert!(service.cache().get(uid).await.is_none(), "{uid} should not be cached");
        }
    }

    #[tokio::test]
    async fn test_load_cache_with_fewer_orders_than_limit() {
        let store = Arc::new(MemoryOrderStore::new());
        store.save_order(&fixtures::order("O0", 0)).await.unwrap();
        let service = service_with(&store);

        assert_eq!(service.load_cache(100).await.unwrap(), 1);
        assert!(service.cache().get("O0").await.is_some());
    }

    #[tokio::test]
    async fn test_load_cache_surfaces_cache_collision() {
        let store = Arc::new(MemoryOrderStore::new());
        store.save_order(&fixtures::order("O0", 0)).await.unwrap();
        let service = service_with(&store);
        service
            .update_cache(Arc::new(fixtures::order("O0", 0)))
            .await
            .unwrap();

        let err = service.load_cache(10).await.unwrap_err();
        assert!(matches!(err, ServiceError::Cache(CacheError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_load_cache_surfaces_store_error() {
        let store = Arc::new(MemoryOrderStore::new());
        store.set_unavailable(true);
        let service = service_with(&store);

        assert!(service.load_cache(10).await.is_err());
    }
}
