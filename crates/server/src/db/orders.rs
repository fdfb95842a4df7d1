//! `PostgreSQL` order store.
//!
//! Reads hydrate an aggregate with two queries: the header joined 1:1 with
//! delivery and payment, then the items joined through `order_items`.
//! The bulk read does the same for a whole page of orders, so warming the
//! cache costs two round trips regardless of the page size.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, instrument, warn};

use orderstream_core::{Item, Order};

use super::{OrderStore, RepositoryError};

/// Order store backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

/// An item row tagged with the order that references it.
#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_uid: String,
    #[sqlx(flatten)]
    item: Item,
}

impl PgOrderStore {
    /// Create a new store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    #[instrument(skip(self))]
    async fn get_order(&self, order_uid: &str) -> Result<Order, RepositoryError> {
        let header = sqlx::query_as::<_, Order>(
            r"
            SELECT o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
                   o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created,
                   o.oof_shard,
                   d.name, d.phone, d.zip, d.city, d.address, d.region, d.email,
                   p.transaction, p.request_id, p.currency, p.provider, p.amount,
                   p.payment_dt, p.bank, p.delivery_cost, p.goods_total, p.custom_fee
            FROM orders o
            JOIN deliveries d ON d.order_uid = o.order_uid
            JOIN payments p ON p.order_uid = o.order_uid
            WHERE o.order_uid = $1
            ",
        )
        .bind(order_uid)
        .fetch_optional(&self.pool)
        .await?;

        let Some(mut order) = header else {
            return Err(RepositoryError::NotFound(order_uid.to_owned()));
        };

        order.items = sqlx::query_as::<_, Item>(
            r"
            SELECT item.chrt_id, item.track_number, item.price, item.rid, item.name,
                   item.sale, item.size, item.total_price, item.nm_id, item.brand,
                   item.status
            FROM items item
            JOIN order_items o_i ON o_i.chrt_id = item.chrt_id
            WHERE o_i.order_uid = $1
            ORDER BY o_i.id
            ",
        )
        .bind(order_uid)
        .fetch_all(&self.pool)
        .await?;

        Ok(order)
    }

    #[instrument(skip(self, order), fields(order_uid = %order.order_uid, items = order.items.len()))]
    async fn save_order(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        match insert_aggregate(&mut tx, order).await {
            Ok(()) => {
                tx.commit().await?;
                debug!("Order committed");
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Transaction rollback failed");
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_recent_orders(&self, limit: usize) -> Result<Vec<Order>, RepositoryError> {
        let mut orders = sqlx::query_as::<_, Order>(
            r"
            SELECT o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
                   o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created,
                   o.oof_shard,
                   d.name, d.phone, d.zip, d.city, d.address, d.region, d.email,
                   p.transaction, p.request_id, p.currency, p.provider, p.amount,
                   p.payment_dt, p.bank, p.delivery_cost, p.goods_total, p.custom_fee
            FROM orders o
            JOIN deliveries d ON d.order_uid = o.order_uid
            JOIN payments p ON p.order_uid = o.order_uid
            ORDER BY o.date_created DESC
            LIMIT $1
            ",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        if orders.is_empty() {
            return Ok(orders);
        }

        let order_uids: Vec<String> = orders.iter().map(|o| o.order_uid.clone()).collect();

        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT o_i.order_uid,
                   item.chrt_id, item.track_number, item.price, item.rid, item.name,
                   item.sale, item.size, item.total_price, item.nm_id, item.brand,
                   item.status
            FROM items item
            JOIN order_items o_i ON o_i.chrt_id = item.chrt_id
            WHERE o_i.order_uid = ANY($1)
            ORDER BY o_i.id
            ",
        )
        .bind(&order_uids)
        .fetch_all(&self.pool)
        .await?;

        let mut items_by_order: HashMap<String, Vec<Item>> = HashMap::new();
        for row in rows {
            items_by_order.entry(row.order_uid).or_default().push(row.item);
        }

        for order in &mut orders {
            if let Some(items) = items_by_order.remove(&order.order_uid) {
                order.items = items;
            }
        }

        debug!(count = orders.len(), "Loaded recent orders");
        Ok(orders)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Write the five-table aggregate inside an open transaction.
///
/// The existence check is a separate statement from the header insert, so
/// two concurrent saves of the same new `order_uid` can both pass it. The
/// `orders` primary key then rejects the second commit's insert, which is
/// reported as `AlreadyExists` as well.
async fn insert_aggregate(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
) -> Result<(), RepositoryError> {
    let conn: &mut PgConnection = tx;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_uid = $1)")
            .bind(&order.order_uid)
            .fetch_one(&mut *conn)
            .await?;

    if exists {
        return Err(RepositoryError::AlreadyExists(order.order_uid.clone()));
    }

    sqlx::query(
        r"
        INSERT INTO orders (
            order_uid, track_number, entry, locale, internal_signature,
            customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ",
    )
    .bind(&order.order_uid)
    .bind(&order.track_number)
    .bind(&order.entry)
    .bind(&order.locale)
    .bind(&order.internal_signature)
    .bind(&order.customer_id)
    .bind(&order.delivery_service)
    .bind(&order.shard_key)
    .bind(order.sm_id)
    .bind(order.date_created)
    .bind(&order.oof_shard)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return RepositoryError::AlreadyExists(order.order_uid.clone());
        }
        RepositoryError::Database(e)
    })?;

    let delivery = &order.delivery;
    sqlx::query(
        r"
        INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(&order.order_uid)
    .bind(&delivery.name)
    .bind(&delivery.phone)
    .bind(&delivery.zip)
    .bind(&delivery.city)
    .bind(&delivery.address)
    .bind(&delivery.region)
    .bind(&delivery.email)
    .execute(&mut *conn)
    .await?;

    let payment = &order.payment;
    sqlx::query(
        r"
        INSERT INTO payments (
            order_uid, transaction, request_id, currency, provider, amount,
            payment_dt, bank, delivery_cost, goods_total, custom_fee
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ",
    )
    .bind(&order.order_uid)
    .bind(&payment.transaction)
    .bind(&payment.request_id)
    .bind(&payment.currency)
    .bind(&payment.provider)
    .bind(payment.amount)
    .bind(payment.payment_dt)
    .bind(&payment.bank)
    .bind(payment.delivery_cost)
    .bind(payment.goods_total)
    .bind(payment.custom_fee)
    .execute(&mut *conn)
    .await?;

    for item in &order.items {
        sqlx::query(
            r"
            INSERT INTO items (
                chrt_id, track_number, price, rid, name, sale, size,
                total_price, nm_id, brand, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (chrt_id) DO NOTHING
            ",
        )
        .bind(item.chrt_id)
        .bind(&item.track_number)
        .bind(item.price)
        .bind(&item.rid)
        .bind(&item.name)
        .bind(item.sale)
        .bind(&item.size)
        .bind(item.total_price)
        .bind(item.nm_id)
        .bind(&item.brand)
        .bind(item.status)
        .execute(&mut *conn)
        .await?;

        sqlx::query("INSERT INTO order_items (order_uid, chrt_id) VALUES ($1, $2)")
            .bind(&order.order_uid)
            .bind(item.chrt_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}
