//! # Store Client
//!
//! This module defines the generic client for communicating with a `StoreActor`.

use crate::error::FrameworkError;
use crate::message::StoreRequest;
use crate::record::Record;
use tokio::sync::{mpsc, oneshot};

/// A type-safe, cloneable handle to a [`StoreActor`](crate::StoreActor).
///
/// The client holds only the sender half of the request channel, so cloning is cheap
/// and clones can be shared across tasks. Every method sends one request and awaits the
/// actor's answer on a oneshot channel.
#[derive(Clone)]
pub struct StoreClient<T: Record> {
    sender: mpsc::Sender<StoreRequest<T>>,
}

impl<T: Record> StoreClient<T> {
    pub fn new(sender: mpsc::Sender<StoreRequest<T>>) -> Self {
        Self { sender }
    }

    pub async fn create(&self, record: T) -> Result<(), FrameworkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StoreRequest::Create { record, respond_to })
            .await
            .map_err(|_| FrameworkError::ActorClosed)?;
        response.await.map_err(|_| FrameworkError::ActorDropped)?
    }

    pub async fn get(&self, id: T::Id) -> Result<Option<T>, FrameworkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StoreRequest::Get { id, respond_to })
            .await
            .map_err(|_| FrameworkError::ActorClosed)?;
        response.await.map_err(|_| FrameworkError::ActorDropped)?
    }

    pub async fn list(&self) -> Result<Vec<T>, FrameworkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StoreRequest::List { respond_to })
            .await
            .map_err(|_| FrameworkError::ActorClosed)?;
        response.await.map_err(|_| FrameworkError::ActorDropped)?
    }

    /// Replaces the stored row unconditionally.
    pub async fn update(&self, record: T) -> Result<T, FrameworkError> {
        self.send_update(record, None).await
    }

    /// Replaces the stored row only if it still reports `expected`.
    pub async fn update_guarded(&self, record: T, expected: T::State) -> Result<T, FrameworkError> {
        self.send_update(record, Some(expected)).await
    }

    /// Asks the actor to stop. Closing an already closed store succeeds.
    pub async fn close(&self) -> Result<(), FrameworkError> {
        let (respond_to, response) = oneshot::channel();
        if self
            .sender
            .send(StoreRequest::Close { respond_to })
            .await
            .is_err()
        {
            return Ok(());
        }
        response.await.map_err(|_| FrameworkError::ActorDropped)?
    }

    async fn send_update(
        &self,
        record: T,
        expected: Option<T::State>,
    ) -> Result<T, FrameworkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(StoreRequest::Update {
                record,
                expected,
                respond_to,
            })
            .await
            .map_err(|_| FrameworkError::ActorClosed)?;
        response.await.map_err(|_| FrameworkError::ActorDropped)?
    }
}
