//! SQLite [`OrderStore`] on an `sqlx` connection pool.

use super::{OrderStore, StoreError};
use crate::model::{Order, OrderId, OrderSide, OrderStatus, OrderType};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS stock_orders (
        id TEXT PRIMARY KEY,
        symbol TEXT NOT NULL,
        order_type TEXT NOT NULL,
        order_side TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        price REAL,
        status TEXT NOT NULL,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        description TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_symbol ON stock_orders(symbol)",
    "CREATE INDEX IF NOT EXISTS idx_status ON stock_orders(status)",
    "CREATE INDEX IF NOT EXISTS idx_created_at ON stock_orders(created_at DESC)",
];

const COLUMNS: &str =
    "id, symbol, order_type, order_side, quantity, price, status, created_at, updated_at, description";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolClosed => StoreError::Closed,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Orders persisted in the `stock_orders` table.
pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    /// Opens (creating if needed) the database at `url`, e.g. `sqlite://stock_orders.db`,
    /// and makes sure the schema exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        info!(url, "Connected to SQLite order store");
        Self::with_pool(pool).await
    }

    /// A private in-memory database. One connection that never expires, since each
    /// `sqlite::memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    async fn exists(&self, id: &OrderId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM stock_orders WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

fn order_from_row(row: &SqliteRow) -> Result<Order, StoreError> {
    let decode = |e: crate::model::UnknownVariant| StoreError::Backend(e.to_string());
    Ok(Order {
        id: OrderId::from(row.try_get::<String, _>("id")?),
        symbol: row.try_get("symbol")?,
        order_type: OrderType::from_str(row.try_get("order_type")?).map_err(decode)?,
        order_side: OrderSide::from_str(row.try_get("order_side")?).map_err(decode)?,
        quantity: row.try_get("quantity")?,
        price: row.try_get::<Option<f64>, _>("price")?.unwrap_or_default(),
        status: OrderStatus::from_str(row.try_get("status")?).map_err(decode)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        description: row.try_get("description")?,
    })
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            "INSERT INTO stock_orders ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(order.id.as_str())
        .bind(&order.symbol)
        .bind(order.order_type.as_str())
        .bind(order.order_side.as_str())
        .bind(order.quantity)
        .bind(order.price)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(&order.description)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(id = %order.id, "Inserted order");
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::AlreadyExists(order.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_by_id(&self, id: &OrderId) -> Result<Order, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM stock_orders WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => order_from_row(&row),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM stock_orders ORDER BY created_at DESC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        let mut orders = rows.iter().map(order_from_row).collect::<Result<Vec<_>, _>>()?;
        // Stored timestamps are text; sort on the decoded values to be exact.
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(orders)
    }

    async fn update(&self, order: &Order) -> Result<Order, StoreError> {
        let affected = sqlx::query(
            "UPDATE stock_orders
             SET symbol = ?, order_type = ?, order_side = ?, quantity = ?, price = ?,
                 status = ?, updated_at = ?, description = ?
             WHERE id = ?",
        )
        .bind(&order.symbol)
        .bind(order.order_type.as_str())
        .bind(order.order_side.as_str())
        .bind(order.quantity)
        .bind(order.price)
        .bind(order.status.as_str())
        .bind(order.updated_at)
        .bind(&order.description)
        .bind(order.id.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::NotFound(order.id.clone()));
        }
        Ok(order.clone())
    }

    async fn update_guarded(
        &self,
        order: &Order,
        expected: OrderStatus,
    ) -> Result<Order, StoreError> {
        let affected = sqlx::query(
            "UPDATE stock_orders
             SET symbol = ?, order_type = ?, order_side = ?, quantity = ?, price = ?,
                 status = ?, updated_at = ?, description = ?
             WHERE id = ? AND status = ?",
        )
        .bind(&order.symbol)
        .bind(order.order_type.as_str())
        .bind(order.order_side.as_str())
        .bind(order.quantity)
        .bind(order.price)
        .bind(order.status.as_str())
        .bind(order.updated_at)
        .bind(&order.description)
        .bind(order.id.as_str())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(if self.exists(&order.id).await? {
                StoreError::Conflict(order.id.clone())
            } else {
                StoreError::NotFound(order.id.clone())
            });
        }
        Ok(order.clone())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        info!("SQLite order store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CreateOrderRequest;
    use chrono::{Duration, Utc};

    fn order(symbol: &str, minutes_ago: i64) -> Order {
        Order::pending(
            OrderId::generate(),
            CreateOrderRequest {
                symbol: symbol.to_string(),
                order_type: OrderType::Limit,
                order_side: OrderSide::Sell,
                quantity: 7,
                price: 12.25,
                description: Some("test".to_string()),
            },
            Utc::now() - Duration::minutes(minutes_ago),
        )
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let store = SqliteOrderStore::in_memory().await.unwrap();
        let created = order("AAPL", 0);
        store.create(&created).await.unwrap();

        let read = store.get_by_id(&created.id).await.unwrap();
        assert_eq!(read, created);

        assert_eq!(
            store.create(&created).await,
            Err(StoreError::AlreadyExists(created.id.clone()))
        );
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let store = SqliteOrderStore::in_memory().await.unwrap();
        let old = order("OLD", 30);
        let new = order("NEW", 0);
        let mid = order("MID", 10);
        for o in [&old, &new, &mid] {
            store.create(o).await.unwrap();
        }

        let symbols: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.symbol)
            .collect();
        assert_eq!(symbols, vec!["NEW", "MID", "OLD"]);
    }

    #[tokio::test]
    async fn test_list_breaks_timestamp_ties_by_id() {
        let store = SqliteOrderStore::in_memory().await.unwrap();
        let first = order("X", 0);
        let mut tied: Vec<Order> = ["b", "d", "a", "c"]
            .into_iter()
            .map(|id| Order {
                id: OrderId::from(id),
                ..first.clone()
            })
            .collect();
        for o in &tied {
            store.create(o).await.unwrap();
        }

        let listed: Vec<OrderId> = store.list().await.unwrap().into_iter().map(|o| o.id).collect();
        tied.sort_by(|a, b| a.id.cmp(&b.id));
        let expected: Vec<OrderId> = tied.into_iter().map(|o| o.id).collect();
        assert_eq!(listed, expected);
    }

    #[tokio::test]
    async fn test_guarded_update_in_sql() {
        let store = SqliteOrderStore::in_memory().await.unwrap();
        let pending = order("AAPL", 0);
        store.create(&pending).await.unwrap();

        let cancelled = pending.transitioned(OrderStatus::Cancelled, Utc::now());
        store
            .update_guarded(&cancelled, OrderStatus::Pending)
            .await
            .unwrap();

        let filled = pending.transitioned(OrderStatus::Filled, Utc::now());
        assert_eq!(
            store.update_guarded(&filled, OrderStatus::Pending).await,
            Err(StoreError::Conflict(pending.id.clone()))
        );
        assert_eq!(
            store.get_by_id(&pending.id).await.unwrap().status,
            OrderStatus::Cancelled
        );

        let ghost = order("GHOST", 0);
        assert_eq!(
            store.update_guarded(&ghost, OrderStatus::Pending).await,
            Err(StoreError::NotFound(ghost.id.clone()))
        );
        assert_eq!(store.update(&ghost).await, Err(StoreError::NotFound(ghost.id.clone())));
    }

    #[tokio::test]
    async fn test_closed_pool_reports_closed() {
        let store = SqliteOrderStore::in_memory().await.unwrap();
        store.close().await.unwrap();
        assert_eq!(store.list().await, Err(StoreError::Closed));
    }
}
