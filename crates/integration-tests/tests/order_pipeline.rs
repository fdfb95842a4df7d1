//! End to end over the in-memory store: stream messages in, HTTP lookups out.

#![allow(clippy::unwrap_used)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use orderstream_core::{Order, fixtures};
use orderstream_integration_tests::{get, service};
use orderstream_server::consumer::{ConsumerState, OrderConsumer};
use orderstream_server::db::memory::MemoryOrderStore;
use orderstream_server::routes;
use orderstream_server::state::AppState;
use orderstream_server::stream::ChannelSource;
use tokio::sync::watch;

fn payload(order: &Order) -> Vec<u8> {
    serde_json::to_vec(order).unwrap()
}

fn static_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../server/static")
}

#[tokio::test]
async fn test_consumed_orders_are_served() {
    let store = Arc::new(MemoryOrderStore::new());
    let orders = service(Arc::clone(&store));
    let (tx, source) = ChannelSource::new(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let a1 = fixtures::order_with_items(
        "A1",
        0,
        vec![fixtures::item(100, 500), fixtures::item(101, 250)],
    );
    let a2 = fixtures::order_with_items("A2", 1, vec![fixtures::item(100, 999)]);

    tx.send(payload(&a1)).await.unwrap();
    tx.send(b"{\"order_uid\": ".to_vec()).await.unwrap();
    tx.send(payload(&a2)).await.unwrap();
    tx.send(payload(&a1)).await.unwrap();
    drop(tx);

    let mut consumer = OrderConsumer::new(source, orders.clone());
    let report = consumer.run(shutdown_rx).await;

    assert_eq!(consumer.state(), ConsumerState::Stopped);
    assert_eq!(report.received, 4);
    assert_eq!(report.persisted, 2);
    assert_eq!(report.decode_failures, 1);
    assert_eq!(report.save_failures, 1);
    // chrt_id 100 is shared: one item row, two references.
    assert_eq!(store.item_rows().await, 2);
    assert_eq!(store.association_rows().await, 3);

    let app = routes::routes().with_state(AppState::new(orders));

    let (status, body) = get(app.clone(), "/order/A1").await;
    assert_eq!(status, StatusCode::OK);
    let served: Order = serde_json::from_slice(&body).unwrap();
    assert_eq!(served, a1);

    let (status, _) = get(app.clone(), "/order/ZZZ").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(app, "/order/").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_restart_serves_from_store_after_warm_up() {
    let store = Arc::new(MemoryOrderStore::new());
    let first = service(Arc::clone(&store));
    for (offset, uid) in ["A1", "A2", "A3"].into_iter().enumerate() {
        let order = fixtures::order(uid, i64::try_from(offset).unwrap());
        first.save_order(Arc::new(order)).await.unwrap();
    }

    // A new process: empty cache over the same store, warmed with the
    // two newest orders.
    let restarted = service(Arc::clone(&store));
    assert_eq!(restarted.load_cache(2).await.unwrap(), 2);
    assert!(restarted.cache().get("A3").await.is_some());
    assert!(restarted.cache().get("A2").await.is_some());
    assert!(restarted.cache().get("A1").await.is_none());

    // A1 misses the cache but is still served from the store.
    let app = routes::routes().with_state(AppState::new(restarted));
    let (status, _) = get(app, "/order/A1").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_landing_page_is_served() {
    let store = Arc::new(MemoryOrderStore::new());
    let app = routes::app(AppState::new(service(store)), &static_dir());

    let (status, body) = get(app, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("/order/"));
}
