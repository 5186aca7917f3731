//! In-memory [`OrderStore`] backed by the generic record-store actor.

use super::{OrderStore, StoreError};
use crate::model::{Order, OrderId, OrderStatus};
use async_trait::async_trait;
use order_runtime::{StoreActor, StoreClient};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

const DEFAULT_BUFFER: usize = 256;

/// Orders kept by a [`StoreActor<Order>`] running in its own task.
pub struct MemoryOrderStore {
    client: StoreClient<Order>,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryOrderStore {
    /// Spawns the store actor. Must be called inside a Tokio runtime.
    pub fn spawn() -> Self {
        Self::spawn_with_buffer(DEFAULT_BUFFER)
    }

    pub fn spawn_with_buffer(buffer_size: usize) -> Self {
        let (actor, client) = StoreActor::new(buffer_size);
        let handle = tokio::spawn(actor.run());
        Self {
            client,
            actor: Mutex::new(Some(handle)),
        }
    }

    /// Wraps an existing client, e.g. one handed out by
    /// [`MockStore`](order_runtime::mock::MockStore).
    pub fn from_client(client: StoreClient<Order>) -> Self {
        Self {
            client,
            actor: Mutex::new(None),
        }
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        Ok(self.client.create(order.clone()).await?)
    }

    async fn get_by_id(&self, id: &OrderId) -> Result<Order, StoreError> {
        self.client
            .get(id.clone())
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.client.list().await?)
    }

    async fn update(&self, order: &Order) -> Result<Order, StoreError> {
        Ok(self.client.update(order.clone()).await?)
    }

    async fn update_guarded(
        &self,
        order: &Order,
        expected: OrderStatus,
    ) -> Result<Order, StoreError> {
        Ok(self.client.update_guarded(order.clone(), expected).await?)
    }

    /// Stops the actor and waits for its task; requests still queued are answered
    /// with `Closed`.
    async fn close(&self) -> Result<(), StoreError> {
        self.client.close().await?;
        if let Some(handle) = self.actor.lock().await.take() {
            handle
                .await
                .map_err(|e| StoreError::Backend(format!("store actor task failed: {e}")))?;
            info!("In-memory order store closed");
        }
        Ok(())
    }
}
