//! In-memory order store for tests.
//!
//! Mirrors the table layout of the `PostgreSQL` store closely enough to
//! observe its contract: headers keyed by `order_uid`, items deduplicated by
//! `chrt_id` with first-writer-wins, and one association row per item
//! reference.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use orderstream_core::{Item, Order};

use super::{OrderStore, RepositoryError};

#[derive(Default)]
struct Tables {
    /// Headers with delivery and payment; `items` is always empty here.
    orders: HashMap<String, Order>,
    items: HashMap<i64, Item>,
    order_items: Vec<(String, i64)>,
}

/// Order store held entirely in memory.
#[derive(Default)]
pub struct MemoryOrderStore {
    tables: RwLock<Tables>,
    save_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save_order` calls, successful or not.
    #[must_use]
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Number of rows in the item table.
    pub async fn item_rows(&self) -> usize {
        self.tables.read().await.items.len()
    }

    /// Number of rows in the order/item association table.
    pub async fn association_rows(&self) -> usize {
        self.tables.read().await.order_items.len()
    }

    /// Number of committed orders.
    pub async fn order_rows(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Make every subsequent call fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

fn hydrate(tables: &Tables, header: &Order) -> Order {
    let items = tables
        .order_items
        .iter()
        .filter(|(uid, _)| *uid == header.order_uid)
        .filter_map(|(_, chrt_id)| tables.items.get(chrt_id).cloned())
        .collect();

    Order {
        items,
        ..header.clone()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get_order(&self, order_uid: &str) -> Result<Order, RepositoryError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        tables
            .orders
            .get(order_uid)
            .map(|header| hydrate(&tables, header))
            .ok_or_else(|| RepositoryError::NotFound(order_uid.to_owned()))
    }

    async fn save_order(&self, order: &Order) -> Result<(), RepositoryError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.order_uid) {
            return Err(RepositoryError::AlreadyExists(order.order_uid.clone()));
        }

        let header = Order {
            items: Vec::new(),
            ..order.clone()
        };
        tables.orders.insert(order.order_uid.clone(), header);

        for item in &order.items {
            tables
                .items
                .entry(item.chrt_id)
                .or_insert_with(|| item.clone());
            tables
                .order_items
                .push((order.order_uid.clone(), item.chrt_id));
        }

        Ok(())
    }

    async fn get_recent_orders(&self, limit: usize) -> Result<Vec<Order>, RepositoryError> {
        self.check_available()?;
        let tables = self.tables.read().await;

        let mut headers: Vec<&Order> = tables.orders.values().collect();
        headers.sort_by(|a, b| b.date_created.cmp(&a.date_created));

        Ok(headers
            .into_iter()
            .take(limit)
            .map(|header| hydrate(&tables, header))
            .collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.check_available()
    }
}
