//! Error types for the order engine.

use crate::model::{OrderId, OrderStatus};
use crate::store::StoreError;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    /// The request is malformed (client fault).
    #[error("Order validation error: {0}")]
    Validation(String),

    /// The requested order was not found.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The order is not in a state that allows the operation.
    #[error("cannot cancel order with status: {status}")]
    InvalidState { id: OrderId, status: OrderStatus },

    /// The store failed; not retried.
    #[error("Order persistence error: {0}")]
    Persistence(String),

    /// A background fulfillment failed. Only ever logged.
    #[error("Order fulfillment error: {0}")]
    Task(String),
}

impl From<StoreError> for OrderError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => OrderError::NotFound(id),
            other => OrderError::Persistence(other.to_string()),
        }
    }
}
