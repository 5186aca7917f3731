//! # Order Model
//!
//! The stock order and its value types.
//!
//! # Record Store
//! [`Order`] implements the [`Record`](order_runtime::Record) trait, so it can be kept
//! by a [`StoreActor`](order_runtime::StoreActor). Guarded updates compare its
//! [`OrderStatus`].
//!
//! # Wire format
//! Fields serialize in snake_case and enum values in upper case (`"LIMIT"`, `"BUY"`,
//! `"PENDING"`), which is also how they are stored in SQLite.

use chrono::{DateTime, Duration, Utc};
use order_runtime::Record;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Type-safe identifier for Orders (a UUIDv4 string).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored enum value that does not name a known variant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! wire_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

wire_enum!(OrderType, "order type", { Market => "MARKET", Limit => "LIMIT" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

wire_enum!(OrderSide, "order side", { Buy => "BUY", Sell => "SELL" });

/// Position in the order state machine.
///
/// ```text
/// Pending ──► Filled
///    ├──────► Cancelled
///    └──────► Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Rejected,
}

wire_enum!(OrderStatus, "order status", {
    Pending => "PENDING",
    Filled => "FILLED",
    Cancelled => "CANCELLED",
    Rejected => "REJECTED",
});

impl OrderStatus {
    /// Terminal states accept no further transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub order_type: OrderType,
    pub order_side: OrderSide,
    pub quantity: i64,
    pub price: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Payload for creating a new order.
///
/// `quantity` is signed so that a negative value is a validation failure rather than a
/// decode failure. `price` may be omitted for market orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub symbol: String,
    pub order_type: OrderType,
    pub order_side: OrderSide,
    pub quantity: i64,
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Order {
    /// Creates a Pending order from an already validated request.
    ///
    /// `created_at` and `updated_at` share one clock read.
    pub fn pending(id: OrderId, request: CreateOrderRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: request.symbol,
            order_type: request.order_type,
            order_side: request.order_side,
            quantity: request.quantity,
            price: request.price,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            description: request.description,
        }
    }

    /// Returns a copy moved to `status`.
    ///
    /// `updated_at` becomes `max(now, updated_at + 1µs)` so every transition strictly
    /// advances it, even on a coarse or stalled clock.
    pub fn transitioned(&self, status: OrderStatus, now: DateTime<Utc>) -> Self {
        let floor = self.updated_at + Duration::microseconds(1);
        Self {
            status,
            updated_at: now.max(floor),
            ..self.clone()
        }
    }
}

impl Record for Order {
    type Id = OrderId;
    type State = OrderStatus;

    fn id(&self) -> &OrderId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn state(&self) -> OrderStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(now: DateTime<Utc>) -> Order {
        Order::pending(
            OrderId::from("order-1"),
            CreateOrderRequest {
                symbol: "AAPL".to_string(),
                order_type: OrderType::Limit,
                order_side: OrderSide::Buy,
                quantity: 10,
                price: 150.5,
                description: None,
            },
            now,
        )
    }

    #[test]
    fn test_wire_names() {
        let order = sample(Utc::now());
        let value = serde_json::to_value(&order).unwrap();

        assert_eq!(value["id"], "order-1");
        assert_eq!(value["order_type"], "LIMIT");
        assert_eq!(value["order_side"], "BUY");
        assert_eq!(value["status"], "PENDING");
        assert!(value.get("created_at").is_some());
        assert!(value.get("description").is_none());
    }

    #[test]
    fn test_request_decodes_without_price() {
        let request: CreateOrderRequest = serde_json::from_value(json!({
            "symbol": "TSLA",
            "order_type": "MARKET",
            "order_side": "SELL",
            "quantity": -5
        }))
        .unwrap();

        assert_eq!(request.order_type, OrderType::Market);
        assert_eq!(request.order_side, OrderSide::Sell);
        assert_eq!(request.quantity, -5);
        assert_eq!(request.price, 0.0);
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("pending".parse::<OrderStatus>().is_err());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_transition_strictly_advances_updated_at() {
        let now = Utc::now();
        let order = sample(now);

        // Same clock reading: still moves forward.
        let cancelled = order.transitioned(OrderStatus::Cancelled, now);
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.updated_at > order.updated_at);
        assert_eq!(cancelled.created_at, order.created_at);
        assert_eq!(cancelled.id, order.id);

        // Clock went backwards: still moves forward.
        let filled = order.transitioned(OrderStatus::Filled, now - Duration::seconds(5));
        assert!(filled.updated_at > order.updated_at);
    }
}
