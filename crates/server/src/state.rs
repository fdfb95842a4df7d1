//! Application state shared across handlers.

use std::sync::Arc;

use crate::services::OrderService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`; the consumer task holds a
/// clone of the same [`OrderService`].
#[derive(Clone, Debug)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Debug)]
struct AppStateInner {
    orders: OrderService,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(orders: OrderService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { orders }),
        }
    }

    /// Get a reference to the order service.
    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }
}
