//! HTTP API server for the order-fulfillment core.
//!
//! Provides REST endpoints for carts, orders and payment callbacks, with
//! structured logging (tracing) and Prometheus metrics.

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use metrics_exporter_prometheus::PrometheusHandle;
use ordering::{CartService, OrderService};
use store::CacheStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    /// Probed by the health check.
    pub cache: Arc<dyn CacheStore>,
    /// The only service allowed to report completed payments.
    pub trusted_service: String,
}

impl AppState {
    pub fn carts(&self) -> &CartService {
        self.orders.carts()
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        .route("/orders", post(routes::orders::create))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/number/{number}", get(routes::orders::get_by_number))
        .route("/orders/customers/{id}", get(routes::orders::list_for_customer))
        .route("/orders/stores/{id}", get(routes::orders::list_for_store))
        .route(
            "/orders/{id}/payment/complete",
            post(routes::orders::complete_payment),
        )
        .route("/orders/{id}/payment/failed", post(routes::orders::fail_payment))
        .route("/orders/{id}/payment/cancel", post(routes::orders::cancel))
        .route("/orders/{id}/status", patch(routes::orders::update_status))
        .route("/cart", get(routes::cart::get))
        .route("/cart/add", post(routes::cart::add))
        .route("/cart/update", patch(routes::cart::update))
        .route("/cart/delete/{menu_id}", delete(routes::cart::remove))
        .route("/cart/clear", delete(routes::cart::clear))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
