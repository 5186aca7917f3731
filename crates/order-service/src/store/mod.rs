//! # Order Store
//!
//! The persistence port of the order engine and its two adapters.
//!
//! | Adapter | Backing | Guarded update evaluated in |
//! |---------|---------|-----------------------------|
//! | [`MemoryOrderStore`] | [`StoreActor<Order>`](order_runtime::StoreActor) | the actor loop |
//! | [`SqliteOrderStore`] | `sqlx` SQLite pool | `UPDATE … WHERE id = ? AND status = ?` |
//!
//! Every status transition goes through [`OrderStore::update_guarded`], so two writers
//! that both read `Pending` cannot both win.

pub mod memory;
pub mod sqlite;

use crate::model::{Order, OrderId, OrderStatus};
use async_trait::async_trait;
use order_runtime::{CloseError, Closeable, FrameworkError};
use std::sync::Arc;

pub use memory::MemoryOrderStore;
pub use sqlite::SqliteOrderStore;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("order not found: {0}")]
    NotFound(OrderId),
    #[error("order already exists: {0}")]
    AlreadyExists(OrderId),
    /// A guarded update found the row in a different state than expected.
    #[error("order {0} changed concurrently")]
    Conflict(OrderId),
    #[error("order store is closed")]
    Closed,
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<FrameworkError> for StoreError {
    fn from(e: FrameworkError) -> Self {
        match e {
            FrameworkError::NotFound(id) => StoreError::NotFound(id.into()),
            FrameworkError::AlreadyExists(id) => StoreError::AlreadyExists(id.into()),
            FrameworkError::Conflict { id, .. } => StoreError::Conflict(id.into()),
            FrameworkError::ActorClosed | FrameworkError::StoreClosed => StoreError::Closed,
            FrameworkError::ActorDropped => {
                StoreError::Backend("store actor dropped the request".to_string())
            }
        }
    }
}

/// Keyed storage for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: &Order) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] if no row has this id.
    async fn get_by_id(&self, id: &OrderId) -> Result<Order, StoreError>;

    /// Every order, newest `created_at` first.
    async fn list(&self) -> Result<Vec<Order>, StoreError>;

    /// Replaces the row with the same id. Fails with `NotFound` if there is none.
    async fn update(&self, order: &Order) -> Result<Order, StoreError>;

    /// Replaces the row only if its stored status is still `expected`; otherwise
    /// fails with [`StoreError::Conflict`].
    async fn update_guarded(&self, order: &Order, expected: OrderStatus)
        -> Result<Order, StoreError>;

    /// Releases the store. Later calls fail with [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;
}

/// Adapts a shared [`OrderStore`] to the shutdown [`Closeable`] capability.
pub struct StoreCloser(pub Arc<dyn OrderStore>);

#[async_trait]
impl Closeable for StoreCloser {
    async fn close(&self) -> Result<(), CloseError> {
        self.0
            .close()
            .await
            .map_err(|e| CloseError::new(e.to_string()))
    }
}
