//! Core types for orderstream.
//!
//! The order aggregate is always read and written as a unit: an [`Order`]
//! owns exactly one [`Delivery`], exactly one [`Payment`], and an ordered
//! list of [`Item`]s.

pub mod order;

pub use order::{DecodeError, Delivery, Item, Order, Payment};
