//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                 - Static landing page (index.html)
//! GET  /health           - Liveness check
//! GET  /health/ready     - Readiness check (store reachable)
//! GET  /order/{uid}      - Order as JSON (200, 400, 404, 500)
//! ```

pub mod health;
pub mod orders;

use std::path::Path;

use axum::{Router, routing::get};
use tower_http::services::ServeFile;

use crate::state::AppState;

/// Create the API routes router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        // The uid is the last path segment; bare and trailing-slash forms
        // reach the same handler so it can answer 400.
        .route("/order", get(orders::show))
        .route("/order/", get(orders::show))
        .route("/order/{*path}", get(orders::show))
}

/// Build the full application router with the landing page.
pub fn app(state: AppState, static_dir: &Path) -> Router {
    routes()
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .with_state(state)
}
