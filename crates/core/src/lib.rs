//! Orderstream Core - Order aggregate types.
//!
//! This crate provides the types shared by every orderstream component:
//! - `server` - Stream consumer, order store, cache, and HTTP read endpoint
//! - `cli` - Migrations and the order producer
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no stream clients. Row hydration for `PostgreSQL` is available behind
//! the `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - The order aggregate (order, delivery, payment, items)

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use types::*;
