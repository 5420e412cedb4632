//! Cart endpoints. The cart always belongs to the calling customer.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CustomerId, MenuId, Money, StoreId};
use domain::{AddCartItem, Cart};
use serde::{Deserialize, Serialize};

use super::orders::parse_id;
use crate::AppState;
use crate::context::Caller;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub menu_id: MenuId,
    pub menu_name: String,
    pub quantity: i64,
    #[serde(alias = "price")]
    pub unit_price: i64,
    pub store_id: StoreId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub menu_id: MenuId,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemResponse {
    pub menu_id: MenuId,
    pub menu_name: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub store_id: StoreId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub customer_id: CustomerId,
    pub store_id: Option<StoreId>,
    pub items: Vec<CartItemResponse>,
    pub subtotal: i64,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        Self {
            customer_id: cart.customer_id(),
            store_id: cart.store_id(),
            items: cart
                .items()
                .iter()
                .map(|item| CartItemResponse {
                    menu_id: item.menu_id,
                    menu_name: item.menu_name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price.amount(),
                    store_id: item.store_id,
                })
                .collect(),
            subtotal: cart.subtotal().amount(),
        }
    }
}

/// GET /cart
#[tracing::instrument(skip(state, caller))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts().get_cart(caller.require_customer()?).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /cart/add
#[tracing::instrument(skip(state, caller, request), fields(menu_id = %request.menu_id))]
pub async fn add(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let item = AddCartItem {
        menu_id: request.menu_id,
        menu_name: request.menu_name,
        quantity: request.quantity,
        unit_price: Money::new(request.unit_price),
        store_id: request.store_id,
    };
    let cart = state
        .carts()
        .add_item(caller.require_customer()?, item)
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// PATCH /cart/update, a quantity of zero removes the line.
#[tracing::instrument(skip(state, caller))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state
        .carts()
        .update_quantity(caller.require_customer()?, request.menu_id, request.quantity)
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /cart/delete/{menu_id}
#[tracing::instrument(skip(state, caller))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(menu_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let menu_id = parse_id(&menu_id, MenuId::parse)?;
    let cart = state
        .carts()
        .remove_item(caller.require_customer()?, menu_id)
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /cart/clear
#[tracing::instrument(skip(state, caller))]
pub async fn clear(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<StatusCode, ApiError> {
    state.carts().clear_cart(caller.require_customer()?).await;
    Ok(StatusCode::NO_CONTENT)
}
