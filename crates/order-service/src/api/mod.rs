//! # HTTP API
//!
//! A thin JSON adapter over [`OrderService`](crate::order_engine::OrderService).
//!
//! | Route | Success | Errors |
//! |-------|---------|--------|
//! | `POST /api/orders` | 201 + order | 400 validation |
//! | `GET /api/orders` | 200 + orders, newest first | 500 |
//! | `GET /api/orders/{id}` | 200 + order | 404 |
//! | `POST /api/orders/{id}/cancel` | 200 + message and order | 404, 409 not pending |
//! | `GET /health` | 200 `{"status": "healthy"}` | |
//!
//! Error bodies are `{"error": "..."}`.

pub mod api_types;
pub mod listener;
pub mod routes;

pub use listener::HttpListener;
pub use routes::{build_router, ApiError, SharedService};
