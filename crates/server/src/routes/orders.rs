//! Order lookup route.

use axum::extract::State;
use axum::http::{Uri, header};
use axum::response::{IntoResponse, Response};
use tracing::{info, instrument, warn};

use crate::error::{AppError, Result};
use crate::state::AppState;

const USAGE_HINT: &str = "provide an order uid, e.g. /order/b563feb7b2b84b6test";

/// The order uid is the final segment of a path under `/order`.
///
/// Returns `None` when that segment is empty or the path is not under `/order`.
#[must_use]
pub fn extract_order_uid(path: &str) -> Option<&str> {
    path.strip_prefix("/order")
        .and_then(|rest| rest.rsplit('/').next())
        .filter(|segment| !segment.is_empty())
}

/// Return one order as JSON.
///
/// The uid segment is percent-decoded before lookup. Any lookup failure is
/// a 404; whether the order is truly absent or the store was unreachable
/// only shows up in the logs.
#[instrument(skip(state), fields(path = %uri.path()))]
pub async fn show(State(state): State<AppState>, uri: Uri) -> Result<Response> {
    let Some(segment) = extract_order_uid(uri.path()) else {
        return Err(AppError::BadRequest(USAGE_HINT.to_string()));
    };
    let order_uid = urlencoding::decode(segment)
        .map_err(|e| AppError::BadRequest(format!("Failed to decode order uid: {e}")))?;

    let order = state.orders().get_order(&order_uid).await.map_err(|e| {
        if e.is_not_found() {
            info!(order_uid = %order_uid, "Order not found");
        } else {
            warn!(order_uid = %order_uid, error = %e, "Order lookup failed");
        }
        AppError::NotFound(format!("order {order_uid}"))
    })?;

    let body = serde_json::to_vec(order.as_ref())?;

    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use orderstream_core::{Order, fixtures};
    use tower::ServiceExt;

    use super::*;
    use crate::cache::OrderCache;
    use crate::db::OrderStore;
    use crate::db::memory::MemoryOrderStore;
    use crate::routes::routes;
    use crate::services::OrderService;

    async fn setup() -> (Arc<MemoryOrderStore>, axum::Router) {
        let store = Arc::new(MemoryOrderStore::new());
        let service =
            OrderService::new(Arc::clone(&store) as Arc<dyn OrderStore>, OrderCache::new());
        service
            .save_order(Arc::new(fixtures::order_with_items(
                "A1",
                0,
                vec![fixtures::item(100, 500)],
            )))
            .await
            .unwrap();
        let app = routes().with_state(AppState::new(service));
        (store, app)
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, content_type, body)
    }

    #[test]
    fn test_extract_order_uid() {
        assert_eq!(extract_order_uid("/order/A1"), Some("A1"));
        assert_eq!(extract_order_uid("/order/nested/A1"), Some("A1"));
        assert_eq!(extract_order_uid("/order/"), None);
        assert_eq!(extract_order_uid("/order"), None);
        assert_eq!(extract_order_uid("/order/A1/"), None);
        assert_eq!(extract_order_uid(""), None);
    }

    #[tokio::test]
    async fn test_get_existing_order() {
        let (_store, app) = setup().await;

        let (status, content_type, body) = get(app, "/order/A1").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        let order: Order = serde_json::from_slice(&body).unwrap();
        assert_eq!(order.order_uid, "A1");
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].chrt_id, 100);
        assert_eq!(order.items[0].price, 500);
    }

    #[tokio::test]
    async fn test_get_order_with_encoded_uid() {
        let (store, app) = setup().await;
        store.save_order(&fixtures::order("A 1", 1)).await.unwrap();

        let (status, _, body) = get(app.clone(), "/order/A%201").await;
        assert_eq!(status, StatusCode::OK);
        let order: Order = serde_json::from_slice(&body).unwrap();
        assert_eq!(order.order_uid, "A 1");

        let (status, _, _) = get(app, "/order/%FF").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_unknown_order() {
        let (_store, app) = setup().await;
        let (status, _, _) = get(app, "/order/ZZZ").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_empty_uid() {
        let (_store, app) = setup().await;
        let (status, _, body) = get(app.clone(), "/order/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(body).unwrap().contains("/order/"));

        let (status, _, _) = get(app, "/order").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_store_outage_maps_to_not_found() {
        let (store, app) = setup().await;
        store.set_unavailable(true);

        // Cached orders are still served.
        let (status, _, _) = get(app.clone(), "/order/A1").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, body) = get(app, "/order/B2").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!String::from_utf8(body).unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let (store, app) = setup().await;

        let (status, _, body) = get(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");

        let (status, _, _) = get(app.clone(), "/health/ready").await;
        assert_eq!(status, StatusCode::OK);

        store.set_unavailable(true);
        let (status, _, _) = get(app, "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
