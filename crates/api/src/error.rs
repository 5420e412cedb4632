//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ContextError;
use domain::{CartError, OrderError};
use ordering::{CartServiceError, ExternalError, OrderServiceError};
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Client input was rejected before anything changed.
    BadRequest(String),
    /// The caller may not perform this action.
    Forbidden(String),
    NotFound(String),
    /// The resource is in the wrong state for the request.
    Conflict(String),
    /// A dependency is down or a lock could not be taken; retry later.
    Unavailable(String),
    /// Details are logged, never returned.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => {
                tracing::warn!(error = %msg, "dependency unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::Unavailable(_) | StoreError::CacheUnavailable | StoreError::Database(_) => {
            ApiError::Unavailable(err.to_string())
        }
        other => ApiError::Internal(other.to_string()),
    }
}

fn cart_error(err: CartError) -> ApiError {
    match err {
        CartError::ItemNotFound { .. } => ApiError::NotFound(err.to_string()),
        _ => ApiError::BadRequest(err.to_string()),
    }
}

impl From<CartServiceError> for ApiError {
    fn from(err: CartServiceError) -> Self {
        match err {
            CartServiceError::Cart(e) => cart_error(e),
            CartServiceError::Storage(e) => store_error(e),
        }
    }
}

impl From<OrderServiceError> for ApiError {
    fn from(err: OrderServiceError) -> Self {
        match err {
            OrderServiceError::Order(e @ OrderError::InvalidStateTransition { .. }) => {
                ApiError::Conflict(e.to_string())
            }
            OrderServiceError::Order(e) => ApiError::BadRequest(e.to_string()),
            OrderServiceError::Cart(e) => e.into(),
            OrderServiceError::OrderNotFound(_) | OrderServiceError::CustomerNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            OrderServiceError::StoreMismatch { .. } => ApiError::BadRequest(err.to_string()),
            OrderServiceError::PointsReservation(ExternalError::Rejected(_)) => {
                ApiError::BadRequest(err.to_string())
            }
            OrderServiceError::PricingUnavailable { .. }
            | OrderServiceError::CustomerCheckUnavailable(_)
            | OrderServiceError::PointsReservation(_)
            | OrderServiceError::Lock(_) => ApiError::Unavailable(err.to_string()),
            OrderServiceError::ConcurrentModification(_) => ApiError::Conflict(err.to_string()),
            OrderServiceError::Storage(e) => store_error(e),
            OrderServiceError::Saga(_) | OrderServiceError::OrderNumberExhausted => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Forbidden => ApiError::Forbidden(err.to_string()),
            ContextError::MissingUser | ContextError::InvalidUserId(_) => {
                ApiError::BadRequest(err.to_string())
            }
        }
    }
}
