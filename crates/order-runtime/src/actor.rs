//! # Record-Store Actor
//!
//! This module defines the `StoreActor`, the "server" half of the in-memory record
//! store. It owns the rows and processes requests sequentially, so the store needs no
//! `Mutex` and a guarded update's compare and write happen as one step.

use crate::client::StoreClient;
use crate::error::FrameworkError;
use crate::message::StoreRequest;
use crate::record::Record;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The generic actor that keeps a keyed collection of records.
///
/// Each actor runs in its own Tokio task and is the only owner of its `HashMap`.
/// Clients talk to it through a bounded mpsc channel and receive answers on oneshot
/// channels.
///
/// # Usage Pattern
///
/// ```rust
/// use chrono::{DateTime, Utc};
/// use order_runtime::{Record, StoreActor};
///
/// #[derive(Clone, Debug)]
/// struct Note { id: u32, created_at: DateTime<Utc> }
///
/// impl Record for Note {
///     type Id = u32;
///     type State = ();
///     fn id(&self) -> &u32 { &self.id }
///     fn created_at(&self) -> DateTime<Utc> { self.created_at }
///     fn state(&self) {}
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let (actor, client) = StoreActor::<Note>::new(10);
///     let handle = tokio::spawn(actor.run());
///
///     client.create(Note { id: 1, created_at: Utc::now() }).await.unwrap();
///     assert!(client.get(1).await.unwrap().is_some());
///
///     client.close().await.unwrap();
///     handle.await.unwrap();
/// }
/// ```
///
/// # Operations
///
/// * **Create**: rejects a duplicate key with `AlreadyExists`.
/// * **Get**: returns a clone of the row, or `None`.
/// * **List**: returns every row ordered by `created_at` descending.
/// * **Update**: replaces the row. With an `expected` state the row must still report
///   that state, otherwise `Conflict`. A missing row is `NotFound`.
/// * **Close**: stops intake; queued requests are answered with `StoreClosed`.
pub struct StoreActor<T: Record> {
    receiver: mpsc::Receiver<StoreRequest<T>>,
    store: HashMap<T::Id, T>,
}

impl<T: Record> StoreActor<T> {
    /// Creates a new `StoreActor` and its associated `StoreClient`.
    ///
    /// `buffer_size` is the capacity of the request channel; when it is full, client
    /// calls wait for space.
    pub fn new(buffer_size: usize) -> (Self, StoreClient<T>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            store: HashMap::new(),
        };
        (actor, StoreClient::new(sender))
    }

    /// Runs the actor's event loop until it is closed or every client is dropped.
    pub async fn run(mut self) {
        // Extract just the type name (e.g., "Order" instead of "order_service::model::order::Order")
        let entity_type = std::any::type_name::<T>()
            .split("::")
            .last()
            .unwrap_or("Unknown");
        info!(entity_type, "Store actor started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                StoreRequest::Create { record, respond_to } => {
                    let id = record.id().clone();
                    if self.store.contains_key(&id) {
                        warn!(entity_type, %id, "Create rejected, key exists");
                        let _ = respond_to.send(Err(FrameworkError::AlreadyExists(id.to_string())));
                        continue;
                    }
                    debug!(entity_type, ?record, "Create");
                    self.store.insert(id.clone(), record);
                    info!(entity_type, %id, size = self.store.len(), "Created");
                    let _ = respond_to.send(Ok(()));
                }
                StoreRequest::Get { id, respond_to } => {
                    let item = self.store.get(&id).cloned();
                    debug!(entity_type, %id, found = item.is_some(), "Get");
                    let _ = respond_to.send(Ok(item));
                }
                StoreRequest::List { respond_to } => {
                    let mut items: Vec<T> = self.store.values().cloned().collect();
                    // Newest first; equal timestamps fall back to id order.
                    items.sort_by(|a, b| {
                        b.created_at()
                            .cmp(&a.created_at())
                            .then_with(|| a.id().cmp(b.id()))
                    });
                    debug!(entity_type, count = items.len(), "List");
                    let _ = respond_to.send(Ok(items));
                }
                StoreRequest::Update {
                    record,
                    expected,
                    respond_to,
                } => {
                    let id = record.id().clone();
                    let Some(current) = self.store.get_mut(&id) else {
                        warn!(entity_type, %id, "Not found");
                        let _ = respond_to.send(Err(FrameworkError::NotFound(id.to_string())));
                        continue;
                    };
                    if let Some(expected) = expected {
                        let actual = current.state();
                        if actual != expected {
                            warn!(entity_type, %id, ?expected, ?actual, "Guarded update rejected");
                            let _ = respond_to.send(Err(FrameworkError::Conflict {
                                id: id.to_string(),
                                actual: format!("{actual:?}"),
                            }));
                            continue;
                        }
                    }
                    debug!(entity_type, ?record, "Update");
                    *current = record;
                    info!(entity_type, %id, "Updated");
                    let _ = respond_to.send(Ok(current.clone()));
                }
                StoreRequest::Close { respond_to } => {
                    info!(entity_type, size = self.store.len(), "Close requested");
                    self.receiver.close();
                    let _ = respond_to.send(Ok(()));
                    // Whatever was queued before the close is answered, not dropped.
                    while let Some(pending) = self.receiver.recv().await {
                        warn!(entity_type, op = pending.op(), "Rejected, store closed");
                        pending.reject_closed();
                    }
                    break;
                }
            }
        }

        info!(entity_type, size = self.store.len(), "Shutdown");
    }
}
