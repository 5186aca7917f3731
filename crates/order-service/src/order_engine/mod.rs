//! # Order Engine
//!
//! Owns the order state machine and schedules fulfillment.
//!
//! ```text
//! create_order ──► validate ──► store.create (Pending) ──► supervisor.schedule(id, delay)
//!                                                                 │
//!                                   after delay: re-read ◄────────┘
//!                                   still Pending? ──► decide ──► update_guarded(.., Pending)
//!
//! cancel_order ──► re-read ──► Pending? ──► update_guarded(Cancelled, Pending) ──► cancel task
//! ```
//!
//! Both the fulfillment task and cancellation write with a guard on `Pending`, so when
//! they race exactly one of them wins. The loser sees a conflict: the task reports a
//! skipped transition, cancellation reports [`OrderError::InvalidState`].

pub mod error;
pub mod fulfillment;

pub use error::*;
pub use fulfillment::*;

use crate::model::{CreateOrderRequest, Order, OrderId, OrderStatus, OrderType};
use crate::store::{OrderStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use order_runtime::{TaskOutcome, TaskSupervisor};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// The operations exposed to API adapters.
#[async_trait]
pub trait OrderService: Send + Sync {
    async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, OrderError>;
    async fn get_order(&self, id: &OrderId) -> Result<Order, OrderError>;
    /// Newest first; empty when there are no orders.
    async fn list_orders(&self) -> Result<Vec<Order>, OrderError>;
    async fn cancel_order(&self, id: &OrderId) -> Result<Order, OrderError>;
}

/// The order lifecycle engine.
///
/// Cheap to clone; clones share the store, supervisor and strategy.
#[derive(Clone)]
pub struct OrderEngine {
    store: Arc<dyn OrderStore>,
    supervisor: TaskSupervisor,
    strategy: Arc<dyn FulfillmentStrategy>,
}

impl OrderEngine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        supervisor: TaskSupervisor,
        strategy: Arc<dyn FulfillmentStrategy>,
    ) -> Self {
        Self {
            store,
            supervisor,
            strategy,
        }
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Schedules fulfillment for every Pending order that has no outstanding task.
    ///
    /// Picks up orders left Pending by an earlier process or by a failed schedule.
    /// Returns how many tasks were scheduled.
    #[instrument(skip(self))]
    pub async fn reconcile_pending(&self) -> Result<usize, OrderError> {
        let orders = self.store.list().await?;
        let mut scheduled = 0;
        for order in orders.iter().filter(|o| !o.status.is_terminal()) {
            if self.supervisor.task_for(order.id.as_str()).is_some() {
                continue;
            }
            if self.schedule_fulfillment(&order.id) {
                scheduled += 1;
            }
        }
        info!(scheduled, "Reconciled pending orders");
        Ok(scheduled)
    }

    /// Never fails the caller: an order that could not be scheduled stays Pending.
    fn schedule_fulfillment(&self, id: &OrderId) -> bool {
        let store = Arc::clone(&self.store);
        let strategy = Arc::clone(&self.strategy);
        let order_id = id.clone();
        let scheduled = self.supervisor.schedule(
            id.as_str(),
            self.strategy.delay(),
            move |cancel| fulfill(store, strategy, order_id, cancel),
        );
        match scheduled {
            Ok(task_id) => {
                debug!(order_id = %id, task_id, "Fulfillment scheduled");
                true
            }
            Err(e) => {
                warn!(order_id = %id, error = %e, "Fulfillment not scheduled, order stays pending");
                false
            }
        }
    }
}

#[async_trait]
impl OrderService for OrderEngine {
    #[instrument(skip(self, request), fields(symbol = %request.symbol))]
    async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, OrderError> {
        debug!(?request, "create_order called");
        let request = validate(request).inspect_err(|e| warn!(error = %e, "Rejected order"))?;

        let order = Order::pending(OrderId::generate(), request, Utc::now());
        self.store
            .create(&order)
            .await
            .map_err(|e| OrderError::Persistence(e.to_string()))?;
        info!(order_id = %order.id, order_type = %order.order_type, "Order created");

        self.schedule_fulfillment(&order.id);
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn get_order(&self, id: &OrderId) -> Result<Order, OrderError> {
        Ok(self.store.get_by_id(id).await?)
    }

    #[instrument(skip(self))]
    async fn list_orders(&self) -> Result<Vec<Order>, OrderError> {
        let orders = self
            .store
            .list()
            .await
            .map_err(|e| OrderError::Persistence(e.to_string()))?;
        debug!(count = orders.len(), "Listed orders");
        Ok(orders)
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, id: &OrderId) -> Result<Order, OrderError> {
        let order = self.store.get_by_id(id).await?;
        if order.status.is_terminal() {
            return Err(OrderError::InvalidState {
                id: id.clone(),
                status: order.status,
            });
        }

        let cancelled = order.transitioned(OrderStatus::Cancelled, Utc::now());
        let stored = match self
            .store
            .update_guarded(&cancelled, OrderStatus::Pending)
            .await
        {
            Ok(stored) => stored,
            Err(StoreError::Conflict(_)) => {
                // Fulfillment got there first.
                let current = self.store.get_by_id(id).await?;
                return Err(OrderError::InvalidState {
                    id: id.clone(),
                    status: current.status,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(task_id) = self.supervisor.cancel_key(id.as_str()) {
            debug!(order_id = %id, task_id, "Fulfillment task cancelled");
        }
        info!(order_id = %id, "Order cancelled");
        Ok(stored)
    }
}

/// Checks a creation request and normalizes it for storage.
///
/// - `symbol` must be non-empty after trimming; the trimmed value is kept.
/// - `quantity` must be greater than 0.
/// - Limit orders need a finite price greater than 0.
/// - Market orders ignore price validity; anything negative or non-finite becomes 0.
pub fn validate(mut request: CreateOrderRequest) -> Result<CreateOrderRequest, OrderError> {
    let symbol = request.symbol.trim();
    if symbol.is_empty() {
        return Err(OrderError::Validation("symbol is required".to_string()));
    }
    request.symbol = symbol.to_string();

    if request.quantity <= 0 {
        return Err(OrderError::Validation(
            "quantity must be greater than 0".to_string(),
        ));
    }

    match request.order_type {
        OrderType::Limit if !request.price.is_finite() => {
            return Err(OrderError::Validation(
                "limit order price must be a finite number".to_string(),
            ));
        }
        OrderType::Limit if request.price <= 0.0 => {
            return Err(OrderError::Validation(
                "limit order must have a price greater than 0".to_string(),
            ));
        }
        OrderType::Limit => {}
        OrderType::Market => {
            if !(request.price.is_finite() && request.price >= 0.0) {
                request.price = 0.0;
            }
        }
    }
    Ok(request)
}

/// The body of one fulfillment task.
#[instrument(skip(store, strategy, cancel))]
async fn fulfill(
    store: Arc<dyn OrderStore>,
    strategy: Arc<dyn FulfillmentStrategy>,
    id: OrderId,
    cancel: CancellationToken,
) -> Result<TaskOutcome, OrderError> {
    if cancel.is_cancelled() {
        return Ok(TaskOutcome::Skipped("cancelled".to_string()));
    }

    let order = match store.get_by_id(&id).await {
        Ok(order) => order,
        Err(StoreError::NotFound(_)) => {
            return Ok(TaskOutcome::Skipped("order no longer exists".to_string()))
        }
        Err(e) => return Err(OrderError::Task(e.to_string())),
    };
    if order.status.is_terminal() {
        return Ok(TaskOutcome::Skipped(format!(
            "status is already {}",
            order.status
        )));
    }

    let next = match strategy.decide(&order) {
        FulfillmentDecision::Fill => order.transitioned(OrderStatus::Filled, Utc::now()),
        FulfillmentDecision::Reject(reason) => Order {
            description: Some(reason),
            ..order.transitioned(OrderStatus::Rejected, Utc::now())
        },
    };

    match store.update_guarded(&next, OrderStatus::Pending).await {
        Ok(_) => {
            info!(status = %next.status, "Order fulfilled");
            Ok(TaskOutcome::Completed)
        }
        Err(StoreError::Conflict(_)) => Ok(TaskOutcome::Skipped(
            "status changed concurrently".to_string(),
        )),
        Err(e) => Err(OrderError::Task(e.to_string())),
    }
}
