//! Axum router and HTTP handlers.
//!
//! `build_router` returns the bare router; middleware (tracing) is attached by the
//! caller so tests can drive the router directly with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, warn};

use super::api_types::{CancelResponse, ErrorResponse, HealthResponse};
use crate::model::{CreateOrderRequest, OrderId};
use crate::order_engine::{OrderError, OrderService};

pub type SharedService = Arc<dyn OrderService>;

/// Build the application router wired to the given order service.
pub fn build_router(service: SharedService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/orders", post(create_order).get(list_orders))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/cancel", post(cancel_order))
        .with_state(service)
}

/// An [`OrderError`] rendered as `{"error": "..."}` with a matching status code.
pub struct ApiError(pub OrderError);

impl From<OrderError> for ApiError {
    fn from(e: OrderError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            OrderError::Validation(_) => StatusCode::BAD_REQUEST,
            OrderError::NotFound(_) => StatusCode::NOT_FOUND,
            OrderError::InvalidState { .. } => StatusCode::CONFLICT,
            OrderError::Persistence(_) | OrderError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            warn!(error = %self.0, %status, "Request rejected");
        }
        error_response(status, self.0.to_string())
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

pub(crate) async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /api/orders
// ---------------------------------------------------------------------------

pub(crate) async fn create_order(
    State(service): State<SharedService>,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Undecodable order request");
            return Ok(error_response(
                StatusCode::BAD_REQUEST,
                "invalid request body".to_string(),
            ));
        }
    };
    let order = service.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(order)).into_response())
}

// ---------------------------------------------------------------------------
// GET /api/orders
// ---------------------------------------------------------------------------

pub(crate) async fn list_orders(State(service): State<SharedService>) -> Result<Response, ApiError> {
    let orders = service.list_orders().await?;
    Ok((StatusCode::OK, Json(orders)).into_response())
}

// ---------------------------------------------------------------------------
// GET /api/orders/{id}
// ---------------------------------------------------------------------------

pub(crate) async fn get_order(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let order = service.get_order(&OrderId::from(id)).await?;
    Ok((StatusCode::OK, Json(order)).into_response())
}

// ---------------------------------------------------------------------------
// POST /api/orders/{id}/cancel
// ---------------------------------------------------------------------------

pub(crate) async fn cancel_order(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let order = service.cancel_order(&OrderId::from(id)).await?;
    Ok((
        StatusCode::OK,
        Json(CancelResponse {
            message: "order cancelled successfully".to_string(),
            order,
        }),
    )
        .into_response())
}
