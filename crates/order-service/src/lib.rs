//! # Order Service Library
//!
//! The stock-order domain on top of `order_runtime`, exposed for the binary and for
//! integration testing.
//!
//! - **[model]**: [`Order`](model::Order) and its value types.
//! - **[store]**: the [`OrderStore`](store::OrderStore) port with in-memory and SQLite adapters.
//! - **[order_engine]**: validation, the state machine and supervised fulfillment.
//! - **[api]**: the axum HTTP adapter.
//! - **[config]**: environment configuration.
//! - **[lifecycle]**: [`OrderSystem`](lifecycle::OrderSystem), startup wiring and ordered shutdown.

pub mod api;
pub mod config;
pub mod lifecycle;
pub mod model;
pub mod order_engine;
pub mod store;
