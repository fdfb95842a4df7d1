//! The order aggregate.
//!
//! Field names follow the canonical JSON form published on the order
//! topic and returned by the read endpoint. The same structs hydrate
//! `PostgreSQL` rows when the `postgres` feature is enabled; `shardkey`
//! keeps its wire spelling in both places.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding an order payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not valid JSON or does not match the order shape.
    #[error("malformed order payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload decoded but carries an empty `order_uid`.
    #[error("order payload has an empty order_uid")]
    EmptyOrderUid,
}

/// An order, the aggregate root.
///
/// `order_uid` is globally unique and never changes once the order has
/// been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    #[cfg_attr(feature = "postgres", sqlx(flatten))]
    pub delivery: Delivery,
    #[cfg_attr(feature = "postgres", sqlx(flatten))]
    pub payment: Payment,
    /// Hydrated by a separate query; never part of the header row.
    #[cfg_attr(feature = "postgres", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    #[serde(rename = "shardkey")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "shardkey"))]
    pub shard_key: String,
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

/// Delivery details, owned 1:1 by an order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// Payment details, owned 1:1 by an order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Unix timestamp in seconds.
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

/// A line item.
///
/// `chrt_id` content-addresses the item: the first order to reference a
/// given `chrt_id` decides its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

impl Order {
    /// Decode an order from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Json` if the payload is not a well-formed order,
    /// or `DecodeError::EmptyOrderUid` if the identifier is blank.
    pub fn from_json(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut order: Self = serde_json::from_slice(payload)?;
        if order.order_uid.trim().is_empty() {
            return Err(DecodeError::EmptyOrderUid);
        }
        // Postgres TIMESTAMPTZ keeps microseconds.
        order.date_created = order.date_created.trunc_subsecs(6);
        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "order_uid": "b563feb7b2b84b6test",
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": "b563feb7b2b84b6test",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [
            {
                "chrt_id": 9934930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2389212,
                "brand": "Vivienne Sabo",
                "status": 202
            }
        ],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1"
    }"#;

    #[test]
    fn test_decode_sample_order() {
        let order = Order::from_json(SAMPLE.as_bytes()).unwrap();
        assert_eq!(order.order_uid, "b563feb7b2b84b6test");
        assert_eq!(order.shard_key, "9");
        assert_eq!(order.delivery.city, "Kiryat Mozkin");
        assert_eq!(order.payment.amount, 1817);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].chrt_id, 9_934_930);
        assert_eq!(order.date_created.to_rfc3339(), "2021-11-26T06:22:19+00:00");
    }

    #[test]
    fn test_encode_uses_wire_field_names() {
        let order = Order::from_json(SAMPLE.as_bytes()).unwrap();
        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["shardkey"], "9");
        assert!(value.get("shard_key").is_none());
        assert_eq!(value["items"][0]["chrt_id"], 9_934_930);
    }

    #[test]
    fn test_decode_truncates_date_created_to_micros() {
        let mut value: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        value["date_created"] = serde_json::Value::String("2021-11-26T06:22:19.123456789Z".into());
        let order = Order::from_json(value.to_string().as_bytes()).unwrap();
        assert_eq!(order.date_created.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(
            order.date_created.to_rfc3339(),
            "2021-11-26T06:22:19.123456+00:00"
        );
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let result = Order::from_json(b"definitely not json");
        assert!(matches!(result, Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_missing_delivery() {
        let mut value: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        value.as_object_mut().unwrap().remove("delivery");
        let result = Order::from_json(value.to_string().as_bytes());
        assert!(matches!(result, Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_blank_uid() {
        let mut value: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        value["order_uid"] = serde_json::Value::String("  ".to_string());
        let result = Order::from_json(value.to_string().as_bytes());
        assert!(matches!(result, Err(DecodeError::EmptyOrderUid)));
    }

    #[test]
    fn test_missing_items_decode_as_empty() {
        let mut value: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        value.as_object_mut().unwrap().remove("items");
        let order = Order::from_json(value.to_string().as_bytes()).unwrap();
        assert!(order.items.is_empty());
    }
}
