//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{CustomerId, MenuId, Money, StoreId};
use lock::{DistributedLockService, InMemoryLockBackend};
use metrics_exporter_prometheus::PrometheusHandle;
use ordering::{
    CartService, InMemoryCustomerDirectory, InMemoryMenuCatalog, InMemoryPointsLedger,
    OrderService, OrderServiceConfig, OrderServiceDeps,
};
use serde_json::{Value, json};
use store::{InMemoryCache, InMemoryCartRepository, InMemoryOrderRepository};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    router: axum::Router,
    catalog: InMemoryMenuCatalog,
    cache: InMemoryCache,
}

fn setup() -> TestApp {
    let cache = InMemoryCache::new();
    let catalog = InMemoryMenuCatalog::new();
    let orders = OrderService::new(
        OrderServiceDeps {
            orders: Arc::new(InMemoryOrderRepository::new()),
            carts: CartService::new(
                Arc::new(cache.clone()),
                Arc::new(InMemoryCartRepository::new()),
            ),
            prices: Arc::new(catalog.clone()),
            customers: Arc::new(InMemoryCustomerDirectory::accepting_all()),
            points: Arc::new(InMemoryPointsLedger::new()),
            locks: DistributedLockService::new(Arc::new(InMemoryLockBackend::new())),
        },
        OrderServiceConfig::default(),
    );
    let state = api::AppState {
        orders,
        cache: Arc::new(cache.clone()),
        trusted_service: "payment-service".to_string(),
    };

    TestApp {
        router: api::create_app(Arc::new(state), get_metrics_handle()),
        catalog,
        cache,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn json_request(method: &str, uri: &str, headers: &[(&str, String)], body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn empty_request(method: &str, uri: &str, headers: &[(&str, String)]) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    builder.body(Body::empty()).unwrap()
}

fn customer(id: CustomerId) -> Vec<(&'static str, String)> {
    vec![("X-User-Id", id.to_string()), ("X-User-Type", "customer".to_string())]
}

fn payment_service() -> Vec<(&'static str, String)> {
    vec![("X-Service-Name", "payment-service".to_string())]
}

/// Adds the reference lines to the customer's cart and prices them.
async fn fill_cart(app: &TestApp, customer_id: CustomerId, store_id: StoreId) {
    for (quantity, price) in [(2, 8), (1, 7)] {
        let menu_id = MenuId::new();
        app.catalog.set_price(menu_id, Money::new(price)).await;
        let (status, _) = send(
            app,
            json_request(
                "POST",
                "/cart/add",
                &customer(customer_id),
                json!({
                    "menuId": menu_id,
                    "menuName": format!("Menu {price}"),
                    "quantity": quantity,
                    "price": price,
                    "storeId": store_id,
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}

async fn place_order(app: &TestApp, customer_id: CustomerId, store_id: StoreId) -> Value {
    fill_cart(app, customer_id, store_id).await;
    let (status, order) = send(
        app,
        json_request(
            "POST",
            "/orders",
            &customer(customer_id),
            json!({
                "storeId": store_id,
                "orderType": "PICKUP",
                "usePoints": true,
                "pointsToUse": 5,
                "pickupRequests": "No onions"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    order
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let (status, json) = send(&app, empty_request("GET", "/health", &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["cache"], "up");

    app.cache.set_available(false);
    let (status, json) = send(&app, empty_request("GET", "/health", &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cache"], "down");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    let response = app
        .router
        .clone()
        .oneshot(empty_request("GET", "/metrics", &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cart_lifecycle() {
    let app = setup();
    let customer_id = CustomerId::new();
    let store_id = StoreId::new();
    fill_cart(&app, customer_id, store_id).await;

    let (status, cart) = send(&app, empty_request("GET", "/cart", &customer(customer_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["subtotal"], 23);
    assert_eq!(cart["storeId"], json!(store_id));
    let first_menu = cart["items"][0]["menuId"].as_str().unwrap().to_string();

    let (status, cart) = send(
        &app,
        json_request(
            "PATCH",
            "/cart/update",
            &customer(customer_id),
            json!({ "menuId": first_menu, "quantity": 0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        empty_request(
            "DELETE",
            &format!("/cart/delete/{first_menu}"),
            &customer(customer_id),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some());

    let (status, _) = send(&app, empty_request("DELETE", "/cart/clear", &customer(customer_id))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, cart) = send(&app, empty_request("GET", "/cart", &customer(customer_id))).await;
    assert!(cart["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cart_rejects_other_store_and_bad_input() {
    let app = setup();
    let customer_id = CustomerId::new();
    fill_cart(&app, customer_id, StoreId::new()).await;

    let add = |store_id: StoreId, quantity: i64| {
        json_request(
            "POST",
            "/cart/add",
            &customer(customer_id),
            json!({
                "menuId": MenuId::new(),
                "menuName": "Kimbap",
                "quantity": quantity,
                "price": 5,
                "storeId": store_id,
            }),
        )
    };

    let (status, _) = send(&app, add(StoreId::new(), 1)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, add(StoreId::new(), 0)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cart_requires_caller_identity() {
    let app = setup();
    let (status, _) = send(&app, empty_request("GET", "/cart", &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        empty_request("GET", "/cart", &[("X-User-Id", "not-a-uuid".to_string())]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_and_get_order() {
    let app = setup();
    let customer_id = CustomerId::new();
    let store_id = StoreId::new();
    let order = place_order(&app, customer_id, store_id).await;

    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["orderType"], "PICKUP");
    assert_eq!(order["totalPrice"], 23);
    assert_eq!(order["finalPaymentAmount"], 18);
    assert_eq!(order["pickupRequests"], "No onions");
    assert!(order["paymentId"].is_null());

    let id = order["orderId"].as_str().unwrap();
    let (status, fetched) = send(&app, empty_request("GET", &format!("/orders/{id}"), &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["orderNumber"], order["orderNumber"]);

    let number = order["orderNumber"].as_str().unwrap();
    let (status, by_number) = send(
        &app,
        empty_request("GET", &format!("/orders/number/{number}"), &[]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_number["orderId"], order["orderId"]);

    // The cart was cleared by the order
    let (_, cart) = send(&app, empty_request("GET", "/cart", &customer(customer_id))).await;
    assert!(cart["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_cart_order_is_bad_request() {
    let app = setup();
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            &customer(CustomerId::new()),
            json!({ "storeId": StoreId::new(), "orderType": "PICKUP" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cart is empty");
}

#[tokio::test]
async fn test_pricing_outage_is_service_unavailable() {
    let app = setup();
    let customer_id = CustomerId::new();
    let store_id = StoreId::new();
    fill_cart(&app, customer_id, store_id).await;
    app.catalog.set_available(false);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/orders",
            &customer(customer_id),
            json!({ "storeId": store_id, "orderType": "PICKUP" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_get_unknown_and_malformed_order() {
    let app = setup();
    let (status, _) = send(
        &app,
        empty_request("GET", &format!("/orders/{}", common::OrderId::new()), &[]),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, empty_request("GET", "/orders/not-a-uuid", &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid ID format"));
}

#[tokio::test]
async fn test_payment_completion_is_idempotent() {
    let app = setup();
    let order = place_order(&app, CustomerId::new(), StoreId::new()).await;
    let id = order["orderId"].as_str().unwrap();
    let uri = format!("/orders/{id}/payment/complete");
    let first_payment = common::PaymentId::new();

    let (status, body) = send(
        &app,
        json_request("POST", &uri, &payment_service(), json!({ "paymentId": first_payment })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PAID");
    assert_eq!(body["alreadyPaid"], false);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &uri,
            &payment_service(),
            json!({ "paymentId": common::PaymentId::new(), "paidAmount": 18 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alreadyPaid"], true);
    assert_eq!(body["paymentId"], json!(first_payment));

    // A late failure leaves the order paid
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{id}/payment/failed"),
            &[],
            json!({ "failureReason": "card declined" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PAID");
    assert_eq!(body["result"], "IGNORED");
}

#[tokio::test]
async fn test_payment_completion_requires_trusted_service() {
    let app = setup();
    let order = place_order(&app, CustomerId::new(), StoreId::new()).await;
    let id = order["orderId"].as_str().unwrap();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{id}/payment/complete"),
            &[("X-Service-Name", "store-service".to_string())],
            json!({ "paymentId": common::PaymentId::new() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_completion_after_failure_conflicts() {
    let app = setup();
    let order = place_order(&app, CustomerId::new(), StoreId::new()).await;
    let id = order["orderId"].as_str().unwrap();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{id}/payment/failed"),
            &[],
            json!({ "failureReason": "insufficient funds", "errorCode": "E51" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PAYMENT_FAILED");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{id}/payment/complete"),
            &payment_service(),
            json!({ "paymentId": common::PaymentId::new() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_blank_failure_reason_is_rejected() {
    let app = setup();
    let order = place_order(&app, CustomerId::new(), StoreId::new()).await;
    let id = order["orderId"].as_str().unwrap();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{id}/payment/failed"),
            &[],
            json!({ "failureReason": "  " }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_twice() {
    let app = setup();
    let order = place_order(&app, CustomerId::new(), StoreId::new()).await;
    let uri = format!("/orders/{}/payment/cancel", order["orderId"].as_str().unwrap());

    let (status, body) = send(&app, empty_request("POST", &uri, &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "APPLIED");

    let (_, body) = send(&app, empty_request("POST", &uri, &[])).await;
    assert_eq!(body["result"], "UNCHANGED");
    assert_eq!(body["status"], "CANCELLED");
}

#[tokio::test]
async fn test_status_update_is_admin_only() {
    let app = setup();
    let order = place_order(&app, CustomerId::new(), StoreId::new()).await;
    let uri = format!("/orders/{}/status", order["orderId"].as_str().unwrap());

    let (status, _) = send(
        &app,
        json_request(
            "PATCH",
            &uri,
            &[("X-User-Type", "manager".to_string())],
            json!({ "statusCode": "CANCELLED" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = [("X-User-Type", "admin".to_string())];
    let (status, _) = send(
        &app,
        json_request("PATCH", &uri, &admin, json!({ "statusCode": "SHIPPED" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        json_request("PATCH", &uri, &admin, json!({ "statusCode": "PAID" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PAID");
}

#[tokio::test]
async fn test_order_listings_check_roles() {
    let app = setup();
    let customer_id = CustomerId::new();
    let store_id = StoreId::new();
    place_order(&app, customer_id, store_id).await;

    let (status, _) = send(
        &app,
        empty_request(
            "GET",
            &format!("/orders/customers/{customer_id}"),
            &[("X-User-Type", "manager".to_string())],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, orders) = send(
        &app,
        empty_request(
            "GET",
            &format!("/orders/customers/{customer_id}"),
            &[("X-User-Type", "admin".to_string())],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().unwrap().len(), 1);

    let (status, orders) = send(
        &app,
        empty_request(
            "GET",
            &format!("/orders/stores/{store_id}"),
            &[("X-User-Type", "manager".to_string())],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().unwrap().len(), 1);
}
