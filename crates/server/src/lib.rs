//! Orderstream server library.
//!
//! Ingests order events from Kafka, persists each order exactly once in
//! `PostgreSQL`, and serves lookups by `order_uid` from an in-memory cache
//! with the store as fallback.
//!
//! # Pipeline
//!
//! ```text
//! Kafka ─▶ OrderConsumer ─▶ OrderService::save_order ─▶ PgOrderStore (commit)
//!                                                   └─▶ OrderCache
//! GET /order/{uid} ─▶ OrderService::get_order ─▶ OrderCache (hit)
//!                                            └─▶ PgOrderStore (miss, not written back)
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
pub mod stream;
