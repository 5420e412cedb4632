//! Order placement, queries and payment callbacks.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CustomerId, MenuId, OrderId, PaymentId, StoreId};
use domain::{Fulfillment, Order, PaymentOutcome, Transition};
use ordering::CreateOrderRequest;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;
use crate::context::Caller;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompleteRequest {
    pub payment_id: PaymentId,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub paid_amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailedRequest {
    #[serde(default)]
    pub payment_id: Option<PaymentId>,
    pub failure_reason: String,
    #[serde(default)]
    pub error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub status_code: String,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineResponse {
    pub menu_id: MenuId,
    pub menu_name: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub line_total: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub store_id: StoreId,
    pub status: &'static str,
    pub order_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_requests: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_requests: Option<String>,
    pub lines: Vec<OrderLineResponse>,
    pub total_price: i64,
    pub use_points: bool,
    pub points_to_use: i64,
    pub final_payment_amount: i64,
    pub payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        let (delivery_address, delivery_requests, pickup_requests) = match order.fulfillment() {
            Fulfillment::Delivery { address, requests } => {
                (Some(address.clone()), requests.clone(), None)
            }
            Fulfillment::Pickup { requests } => (None, None, requests.clone()),
        };

        Self {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            customer_id: order.customer_id(),
            store_id: order.store_id(),
            status: order.status().as_str(),
            order_type: order.order_type().as_str(),
            delivery_address,
            delivery_requests,
            pickup_requests,
            lines: order
                .lines()
                .iter()
                .map(|line| OrderLineResponse {
                    menu_id: line.menu_id,
                    menu_name: line.menu_name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price.amount(),
                    line_total: line.line_total().amount(),
                })
                .collect(),
            total_price: order.total_price().amount(),
            use_points: order.use_points(),
            points_to_use: order.points_to_use().amount(),
            final_payment_amount: order.final_payment_amount().amount(),
            payment_id: order.payment_id(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompleteResponse {
    pub order_id: OrderId,
    /// The payment id on record, which is the first one on repeats.
    pub payment_id: Option<PaymentId>,
    pub status: &'static str,
    pub already_paid: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub order_id: OrderId,
    pub status: &'static str,
    /// `APPLIED`, `UNCHANGED` or `IGNORED`.
    pub result: &'static str,
}

impl TransitionResponse {
    fn new(order: &Order, transition: Transition) -> Self {
        let result = match transition {
            Transition::Applied => "APPLIED",
            Transition::Unchanged => "UNCHANGED",
            Transition::Rejected { .. } => "IGNORED",
        };
        Self {
            order_id: order.id(),
            status: order.status().as_str(),
            result,
        }
    }
}

// -- Handlers --

/// POST /orders, places an order for the caller's cart.
#[tracing::instrument(skip(state, caller, request))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let customer_id = caller.require_customer()?;
    let order = state
        .orders
        .create_order_from_cart(customer_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.get_order(parse_id(&id, OrderId::parse)?).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/number/{number}
#[tracing::instrument(skip(state))]
pub async fn get_by_number(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.get_order_by_number(&number).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/customers/{id}, administrators only.
#[tracing::instrument(skip(state, caller))]
pub async fn list_for_customer(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    caller.require_admin()?;
    let orders = state
        .orders
        .orders_for_customer(parse_id(&id, CustomerId::parse)?)
        .await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/stores/{id}, managers and administrators.
#[tracing::instrument(skip(state, caller))]
pub async fn list_for_store(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    caller.require_manager_or_admin()?;
    let orders = state
        .orders
        .orders_for_store(parse_id(&id, StoreId::parse)?)
        .await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// POST /orders/{id}/payment/complete, called by the payment service.
#[tracing::instrument(skip(state, caller, request), fields(payment_id = %request.payment_id))]
pub async fn complete_payment(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(request): Json<PaymentCompleteRequest>,
) -> Result<Json<PaymentCompleteResponse>, ApiError> {
    caller
        .require_service(&state.trusted_service)
        .inspect_err(|_| {
            metrics::counter!("payment_callbacks_rejected_total").increment(1);
        })?;
    let order_id = parse_id(&id, OrderId::parse)?;
    metrics::counter!("payment_callbacks_total", "kind" => "complete").increment(1);
    info!(
        %order_id,
        method = request.payment_method.as_deref().unwrap_or("unknown"),
        transaction_id = request.transaction_id.as_deref().unwrap_or(""),
        paid_amount = request.paid_amount,
        "Payment completion callback"
    );

    let outcome = state
        .orders
        .complete_payment(order_id, request.payment_id)
        .await?;
    let order = state.orders.get_order(order_id).await?;

    Ok(Json(PaymentCompleteResponse {
        order_id,
        payment_id: order.payment_id(),
        status: order.status().as_str(),
        already_paid: outcome == PaymentOutcome::AlreadyPaid,
    }))
}

/// POST /orders/{id}/payment/failed
#[tracing::instrument(skip(state, request))]
pub async fn fail_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<PaymentFailedRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let order_id = parse_id(&id, OrderId::parse)?;
    metrics::counter!("payment_callbacks_total", "kind" => "failed").increment(1);
    if request.failure_reason.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "failureReason must not be blank".to_string(),
        ));
    }
    info!(
        %order_id,
        payment_id = ?request.payment_id,
        error_code = request.error_code.as_deref().unwrap_or(""),
        "Payment failure callback"
    );

    let transition = state
        .orders
        .fail_payment(order_id, Some(&request.failure_reason))
        .await?;
    let order = state.orders.get_order(order_id).await?;
    Ok(Json(TransitionResponse::new(&order, transition)))
}

/// POST /orders/{id}/payment/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let order_id = parse_id(&id, OrderId::parse)?;
    let transition = state.orders.cancel_order(order_id).await?;
    let order = state.orders.get_order(order_id).await?;
    Ok(Json(TransitionResponse::new(&order, transition)))
}

/// PATCH /orders/{id}/status, administrators only.
#[tracing::instrument(skip(state, caller, request))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    caller.require_admin()?;
    let order_id = parse_id(&id, OrderId::parse)?;
    let transition = state
        .orders
        .update_status(order_id, &request.status_code)
        .await?;
    let order = state.orders.get_order(order_id).await?;
    Ok(Json(TransitionResponse::new(&order, transition)))
}

pub(crate) fn parse_id<T, E: std::fmt::Display>(
    id: &str,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<T, ApiError> {
    parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
