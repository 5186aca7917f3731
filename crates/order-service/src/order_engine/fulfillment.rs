//! # Fulfillment
//!
//! What happens to a Pending order once its fulfillment delay has passed.
//!
//! The strategy only *decides*. The engine re-reads the order first, skips it unless it
//! is still Pending, and persists the decision with a guarded update, so a strategy
//! never sees or writes stale state.

use crate::model::Order;
use std::time::Duration;

/// Default simulated processing time.
pub const DEFAULT_FULFILLMENT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentDecision {
    Fill,
    Reject(String),
}

/// Pluggable fulfillment policy.
pub trait FulfillmentStrategy: Send + Sync + 'static {
    /// How long after creation the order is decided.
    fn delay(&self) -> Duration;

    /// Called with the freshly read, still Pending order.
    fn decide(&self, order: &Order) -> FulfillmentDecision;
}

/// Fills every order after a fixed delay. No price or quantity matching.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelayFill {
    delay: Duration,
}

impl FixedDelayFill {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedDelayFill {
    fn default() -> Self {
        Self::new(DEFAULT_FULFILLMENT_DELAY)
    }
}

impl FulfillmentStrategy for FixedDelayFill {
    fn delay(&self) -> Duration {
        self.delay
    }

    fn decide(&self, _order: &Order) -> FulfillmentDecision {
        FulfillmentDecision::Fill
    }
}
