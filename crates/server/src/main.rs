//! Orderstream server - order ingestion and lookup.
//!
//! Serves order lookups on port 8000 while a background task consumes the
//! order topic.
//!
//! # Architecture
//!
//! - Axum web framework for the read endpoint and landing page
//! - `rskafka` partition consumer for the order topic (newest offset, no group)
//! - `PostgreSQL` via `sqlx` as the durable order store
//! - `moka` in-memory cache, warmed from the most recent orders at startup
//!
//! # Startup
//!
//! 1. Load configuration, Sentry, and tracing
//! 2. Connect to `PostgreSQL`
//! 3. Warm the cache (failure is logged, not fatal)
//! 4. Spawn the consumer (subscription failure is logged; lookups keep working)
//! 5. Serve HTTP until SIGINT/SIGTERM, which also stops the consumer

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{Request, Response};
use orderstream_server::cache::OrderCache;
use orderstream_server::config::{KafkaConfig, ServerConfig};
use orderstream_server::consumer;
use orderstream_server::db::{self, OrderStore, PgOrderStore};
use orderstream_server::routes;
use orderstream_server::services::OrderService;
use orderstream_server::state::AppState;
use orderstream_server::stream::KafkaSource;
use sentry::integrations::tracing::{self as sentry_tracing, EventFilter};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::{Level, Span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set up Sentry and the tracing subscriber.
///
/// Sentry goes first so its tracing layer has a client to report to. The
/// returned guard flushes pending events on drop and must outlive `main`'s
/// work.
fn init_telemetry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let sentry_guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: config.sentry_environment.clone().map(Into::into),
                sample_rate: config.sentry_sample_rate,
                traces_sample_rate: config.sentry_traces_sample_rate,
                attach_stacktrace: true,
                ..Default::default()
            },
        ))
    });

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "orderstream_server=info,tower_http=debug".into());

    let json_layer = config
        .json_logs
        .then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!config.json_logs).then(tracing_subscriber::fmt::layer);

    let sentry_layer = sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
        Level::ERROR | Level::WARN => EventFilter::Event,
        Level::INFO | Level::DEBUG => EventFilter::Breadcrumb,
        _ => EventFilter::Ignore,
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_layer)
        .init();

    if sentry_guard.is_some() {
        tracing::info!("Sentry initialized");
    }
    sentry_guard
}

/// Subscribe to the order topic and run the consumer until shutdown.
///
/// A failed subscription ends the task; the HTTP side keeps serving.
/// Shutdown while still connecting ends the task too.
fn spawn_consumer(
    kafka: KafkaConfig,
    orders: OrderService,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(topic = %kafka.topic, brokers = ?kafka.brokers, "Subscribing to order topic");
        let report = consumer::subscribe_and_run(KafkaSource::connect(&kafka), orders, shutdown).await;
        tracing::debug!(?report, "Consumer task finished");
    })
}

/// Per-request span with status and latency filled in on response.
fn with_request_tracing(app: Router) -> Router {
    app.layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    status = tracing::field::Empty,
                    latency_ms = tracing::field::Empty,
                )
            })
            .on_response(|response: &Response<_>, latency: Duration, span: &Span| {
                span.record("status", response.status().as_u16());
                span.record(
                    "latency_ms",
                    u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                );
                DefaultOnResponse::default().on_response(response, latency, span);
            }),
    )
}

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env().expect("Failed to load configuration");
    let _sentry_guard = init_telemetry(&config);

    let pool = db::create_pool(&config.database)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    // Schema changes are applied out of band: os-cli migrate

    let store: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(pool));
    let orders = OrderService::new(store, OrderCache::new());

    match orders.load_cache(config.cache_warmup_limit).await {
        Ok(count) => tracing::info!(count, "Cache loaded"),
        Err(e) => tracing::error!(error = %e, "Failed to load cache, starting cold"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        // Receivers may already be gone if the server exited on its own.
        let _ = shutdown_tx.send(true);
    });

    let consumer = spawn_consumer(config.kafka.clone(), orders.clone(), shutdown_rx.clone());

    let app = with_request_tracing(routes::app(AppState::new(orders), &config.static_dir))
        // Sentry wraps everything else so every request gets a hub
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!("orderstream listening on http://{}", addr);

    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stopped| *stopped).await;
        })
        .await
        .expect("Server error");

    if let Err(e) = consumer.await {
        tracing::error!(error = %e, "Consumer task panicked");
    }
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining requests and stopping consumer");
}
