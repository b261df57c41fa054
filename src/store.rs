use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

use crate::models::{Delivery, Item, Order, Payment};

// ============================================================================
// Order Store Adapter - durable relational storage
// ============================================================================
//
// The rest of the service talks to storage through the `OrderStore` trait:
// insert the whole aggregate atomically, fetch the whole aggregate by id,
// list the most recently created ids for cache warming. `PgOrderStore` is
// the PostgreSQL implementation; tests substitute the in-memory one below.
// ============================================================================

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist the full aggregate in a single transaction. All sub-records
    /// are written or none are. Re-submitting an already persisted order id
    /// commits nothing and returns Ok.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Fetch the full aggregate by order id, joining delivery, payment and
    /// items. `None` when the id is unknown.
    async fn fetch_order(&self, id: &str) -> Result<Option<Order>>;

    /// Ids of the most recently created orders, newest first.
    async fn fetch_recent_ids(&self, limit: i64) -> Result<Vec<String>>;
}

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to postgres")?;
        tracing::info!("connected to postgres");
        Ok(Self { pool })
    }

    /// Idempotent DDL, run once at startup before any traffic is served.
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS customers (id TEXT PRIMARY KEY)",
            "CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                customer_id TEXT NOT NULL REFERENCES customers(id),
                track_number TEXT NOT NULL,
                entry TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS orders_created_at_idx ON orders (created_at DESC)",
            "CREATE TABLE IF NOT EXISTS deliveries (
                order_uid TEXT PRIMARY KEY REFERENCES orders(id),
                name TEXT NOT NULL,
                phone TEXT NOT NULL,
                zip TEXT NOT NULL,
                city TEXT NOT NULL,
                address TEXT NOT NULL,
                region TEXT NOT NULL,
                email TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS payments (
                order_uid TEXT PRIMARY KEY REFERENCES orders(id),
                transaction TEXT NOT NULL,
                request_id TEXT NOT NULL,
                currency TEXT NOT NULL,
                provider TEXT NOT NULL,
                amount BIGINT NOT NULL,
                payment_dt BIGINT NOT NULL,
                bank TEXT NOT NULL,
                delivery_cost BIGINT NOT NULL,
                goods_total BIGINT NOT NULL,
                custom_fee BIGINT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS order_items (
                id BIGSERIAL PRIMARY KEY,
                order_uid TEXT NOT NULL REFERENCES orders(id),
                chrt_id BIGINT NOT NULL,
                track_number TEXT NOT NULL,
                price BIGINT NOT NULL,
                name TEXT NOT NULL,
                sale INTEGER NOT NULL,
                size TEXT NOT NULL,
                total_price BIGINT NOT NULL,
                nm_id BIGINT NOT NULL,
                brand TEXT NOT NULL,
                status INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS order_items_order_uid_idx ON order_items (order_uid)",
        ];

        for ddl in statements {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .context("schema migration failed")?;
        }

        tracing::info!("order schema ensured");
        Ok(())
    }
}

// Flat row shape for the 1:1 joins. Items come from a second query because
// they multiply the row count.
#[derive(FromRow)]
struct OrderRow {
    id: String,
    customer_id: String,
    track_number: String,
    entry: String,
    created_at: DateTime<Utc>,
    name: String,
    phone: String,
    zip: String,
    city: String,
    address: String,
    region: String,
    email: String,
    transaction: String,
    request_id: String,
    currency: String,
    provider: String,
    amount: i64,
    payment_dt: i64,
    bank: String,
    delivery_cost: i64,
    goods_total: i64,
    custom_fee: i64,
}

#[derive(FromRow)]
struct ItemRow {
    chrt_id: i64,
    track_number: String,
    price: i64,
    name: String,
    sale: i32,
    size: String,
    total_price: i64,
    nm_id: i64,
    brand: String,
    status: i32,
}

impl OrderRow {
    fn into_order(self, items: Vec<Item>) -> Order {
        Order {
            order_uid: self.id,
            customer_id: self.customer_id,
            track_number: self.track_number,
            entry: self.entry,
            created_at: self.created_at,
            delivery: Delivery {
                name: self.name,
                phone: self.phone,
                zip: self.zip,
                city: self.city,
                address: self.address,
                region: self.region,
                email: self.email,
            },
            payment: Payment {
                transaction: self.transaction,
                request_id: self.request_id,
                currency: self.currency,
                provider: self.provider,
                amount: self.amount,
                payment_dt: self.payment_dt,
                bank: self.bank,
                delivery_cost: self.delivery_cost,
                goods_total: self.goods_total,
                custom_fee: self.custom_fee,
            },
            items,
        }
    }
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            chrt_id: row.chrt_id,
            track_number: row.track_number,
            price: row.price,
            name: row.name,
            sale: row.sale,
            size: row.size,
            total_price: row.total_price,
            nm_id: row.nm_id,
            brand: row.brand,
            status: row.status,
        }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Customers are shared across orders; creating one is idempotent.
        sqlx::query("INSERT INTO customers (id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(&order.customer_id)
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            "INSERT INTO orders (id, customer_id, track_number, entry, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&order.order_uid)
        .bind(&order.customer_id)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        // Orders are immutable once persisted. A replayed id commits
        // nothing rather than touching the existing aggregate.
        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            tracing::debug!(order_uid = %order.order_uid, "order already persisted, skipping");
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&order.order_uid)
        .bind(&order.delivery.name)
        .bind(&order.delivery.phone)
        .bind(&order.delivery.zip)
        .bind(&order.delivery.city)
        .bind(&order.delivery.address)
        .bind(&order.delivery.region)
        .bind(&order.delivery.email)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO payments (order_uid, transaction, request_id, currency, provider,
                                   amount, payment_dt, bank, delivery_cost, goods_total, custom_fee)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&order.order_uid)
        .bind(&order.payment.transaction)
        .bind(&order.payment.request_id)
        .bind(&order.payment.currency)
        .bind(&order.payment.provider)
        .bind(order.payment.amount)
        .bind(order.payment.payment_dt)
        .bind(&order.payment.bank)
        .bind(order.payment.delivery_cost)
        .bind(order.payment.goods_total)
        .bind(order.payment.custom_fee)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (order_uid, chrt_id, track_number, price, name,
                                          sale, size, total_price, nm_id, brand, status)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(&order.order_uid)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_order(&self, id: &str) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT o.id, o.customer_id, o.track_number, o.entry, o.created_at,
                    d.name, d.phone, d.zip, d.city, d.address, d.region, d.email,
                    p.transaction, p.request_id, p.currency, p.provider, p.amount,
                    p.payment_dt, p.bank, p.delivery_cost, p.goods_total, p.custom_fee
             FROM orders o
             JOIN deliveries d ON d.order_uid = o.id
             JOIN payments p ON p.order_uid = o.id
             WHERE o.id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, ItemRow>(
            "SELECT chrt_id, track_number, price, name, sale, size,
                    total_price, nm_id, brand, status
             FROM order_items
             WHERE order_uid = $1
             ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_order(items.into_iter().map(Item::from).collect())))
    }

    async fn fetch_recent_ids(&self, limit: i64) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT id FROM orders ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

// ============================================================================
// In-memory store for tests
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use anyhow::bail;
    use chrono::TimeZone;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// `OrderStore` double backed by a map, with per-operation failure
    /// injection. Insertion is all-or-nothing like the real adapter.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        orders: Mutex<HashMap<String, Order>>,
        insertion_log: Mutex<Vec<String>>,
        pub fail_inserts: AtomicBool,
        pub fail_recent_ids: AtomicBool,
        pub fail_fetch_for: Mutex<HashSet<String>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn contains(&self, id: &str) -> bool {
            self.orders.lock().unwrap().contains_key(id)
        }

        pub fn order_count(&self) -> usize {
            self.orders.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl OrderStore for MemoryStore {
        async fn insert_order(&self, order: &Order) -> Result<()> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                bail!("injected insert failure");
            }
            let mut orders = self.orders.lock().unwrap();
            if orders.contains_key(&order.order_uid) {
                return Ok(());
            }
            orders.insert(order.order_uid.clone(), order.clone());
            self.insertion_log.lock().unwrap().push(order.order_uid.clone());
            Ok(())
        }

        async fn fetch_order(&self, id: &str) -> Result<Option<Order>> {
            if self.fail_fetch_for.lock().unwrap().contains(id) {
                bail!("injected fetch failure for {id}");
            }
            Ok(self.orders.lock().unwrap().get(id).cloned())
        }

        async fn fetch_recent_ids(&self, limit: i64) -> Result<Vec<String>> {
            if self.fail_recent_ids.load(Ordering::SeqCst) {
                bail!("injected id listing failure");
            }
            let log = self.insertion_log.lock().unwrap();
            Ok(log.iter().rev().take(limit as usize).cloned().collect())
        }
    }

    pub(crate) fn order_fixture(uid: &str) -> Order {
        Order {
            order_uid: uid.to_owned(),
            customer_id: "test".to_owned(),
            track_number: "WBILMTESTTRACK".to_owned(),
            entry: "WBIL".to_owned(),
            created_at: Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap(),
            delivery: Delivery {
                name: "Test Testov".to_owned(),
                phone: "+9720000000".to_owned(),
                zip: "2639809".to_owned(),
                city: "Kiryat Mozkin".to_owned(),
                address: "Ploshad Mira 15".to_owned(),
                region: "Kraiot".to_owned(),
                email: "test@gmail.com".to_owned(),
            },
            payment: Payment {
                transaction: uid.to_owned(),
                request_id: String::new(),
                currency: "USD".to_owned(),
                provider: "wbpay".to_owned(),
                amount: 1817,
                payment_dt: 1637907727,
                bank: "alpha".to_owned(),
                delivery_cost: 1500,
                goods_total: 317,
                custom_fee: 0,
            },
            items: vec![Item {
                chrt_id: 9934930,
                track_number: "WBILMTESTTRACK".to_owned(),
                price: 453,
                name: "Mascaras".to_owned(),
                sale: 30,
                size: "0".to_owned(),
                total_price: 317,
                nm_id: 2389212,
                brand: "Vivienne Sabo".to_owned(),
                status: 202,
            }],
        }
    }
}
