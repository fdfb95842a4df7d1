//! Business logic services.
//!
//! # Services
//!
//! - `orders` - Cache-aside reads and write-through ingestion over the
//!   order store and order cache

pub mod orders;

pub use orders::{OrderService, ServiceError};
