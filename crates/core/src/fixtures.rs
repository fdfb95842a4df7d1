//! Order builders for tests.
//!
//! Enabled for this crate's own tests and, for downstream crates, via the
//! `fixtures` feature (dev-dependencies only).

use chrono::{DateTime, TimeZone, Utc};

use crate::types::{Delivery, Item, Order, Payment};

/// An order with one delivery, one payment, and no items.
///
/// `created_offset_secs` shifts `date_created` forward from a fixed epoch so
/// tests can control recency ordering.
#[must_use]
pub fn order(order_uid: &str, created_offset_secs: i64) -> Order {
    Order {
        order_uid: order_uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: order_uid.to_string(),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1_637_907_727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items: Vec::new(),
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shard_key: "9".to_string(),
        sm_id: 99,
        date_created: created_at(created_offset_secs),
        oof_shard: "1".to_string(),
    }
}

/// An item with the given `chrt_id` and price.
#[must_use]
pub fn item(chrt_id: i64, price: i64) -> Item {
    Item {
        chrt_id,
        track_number: "WBILMTESTTRACK".to_string(),
        price,
        rid: format!("rid-{chrt_id}"),
        name: "Mascaras".to_string(),
        sale: 30,
        size: "0".to_string(),
        total_price: price * 7 / 10,
        nm_id: 2_389_212,
        brand: "Vivienne Sabo".to_string(),
        status: 202,
    }
}

/// An order carrying the given items.
#[must_use]
pub fn order_with_items(order_uid: &str, created_offset_secs: i64, items: Vec<Item>) -> Order {
    Order {
        items,
        ..order(order_uid, created_offset_secs)
    }
}

fn created_at(offset_secs: i64) -> DateTime<Utc> {
    let base = Utc
        .with_ymd_and_hms(2021, 11, 26, 6, 22, 19)
        .single()
        .unwrap_or_default();
    base + chrono::Duration::seconds(offset_secs)
}
