//! Order lifecycle engine.
//!
//! Orders are created from carts with prices re-fetched from the store
//! service, then driven through the status machine by payment callbacks,
//! payment events, customers and administrators. Every status change runs
//! under a per-order lock and is written with a compare-and-set on the
//! previous status, so duplicate and reordered callbacks converge.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, PaymentId, StoreId};
use domain::{
    Cart, Fulfillment, NewOrder, Order, OrderError, OrderLine, OrderNumber, OrderStatus,
    OrderType, PaymentOutcome, Transition,
};
use futures_util::future::try_join_all;
use lock::DistributedLockService;
use saga::SagaTransaction;
use serde::{Deserialize, Serialize};
use store::{OrderRepository, StoreError};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::external::{CustomerDirectory, ExternalError, MenuPriceLookup, PointsLedger};
use crate::{CartService, OrderServiceError};

/// Attempts at a compare-and-set status write before giving up.
const CONDITIONAL_WRITE_ATTEMPTS: usize = 2;

/// What to do when the customer service cannot answer an existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CustomerCheckPolicy {
    /// Proceed as if the customer exists.
    AllowOnFailure,
    /// Reject the request.
    #[default]
    DenyOnFailure,
}

impl CustomerCheckPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" | "allow_on_failure" => Some(CustomerCheckPolicy::AllowOnFailure),
            "deny" | "deny_on_failure" => Some(CustomerCheckPolicy::DenyOnFailure),
            _ => None,
        }
    }
}

/// Tunables of the order engine.
#[derive(Debug, Clone)]
pub struct OrderServiceConfig {
    pub lock_wait: Duration,
    pub lock_lease: Duration,
    pub customer_check: CustomerCheckPolicy,
    pub order_number_attempts: u32,
}

impl Default for OrderServiceConfig {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_secs(2),
            lock_lease: Duration::from_secs(5),
            customer_check: CustomerCheckPolicy::default(),
            order_number_attempts: 5,
        }
    }
}

/// Order placement parameters supplied by the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub store_id: StoreId,
    pub order_type: OrderType,
    #[serde(default)]
    pub use_points: Option<bool>,
    #[serde(default)]
    pub points_to_use: Option<i64>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub delivery_requests: Option<String>,
    #[serde(default)]
    pub pickup_requests: Option<String>,
}

impl CreateOrderRequest {
    pub fn fulfillment(&self) -> Fulfillment {
        match self.order_type {
            OrderType::Delivery => Fulfillment::Delivery {
                address: self.delivery_address.clone().unwrap_or_default(),
                requests: self.delivery_requests.clone(),
            },
            OrderType::Pickup => Fulfillment::Pickup {
                requests: self.pickup_requests.clone(),
            },
        }
    }
}

/// Collaborators of the order engine.
pub struct OrderServiceDeps {
    pub orders: Arc<dyn OrderRepository>,
    pub carts: CartService,
    pub prices: Arc<dyn MenuPriceLookup>,
    pub customers: Arc<dyn CustomerDirectory>,
    pub points: Arc<dyn PointsLedger>,
    pub locks: DistributedLockService,
}

/// The order lifecycle engine.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    carts: CartService,
    prices: Arc<dyn MenuPriceLookup>,
    customers: Arc<dyn CustomerDirectory>,
    points: Arc<dyn PointsLedger>,
    locks: DistributedLockService,
    config: OrderServiceConfig,
}

impl OrderService {
    pub fn new(deps: OrderServiceDeps, config: OrderServiceConfig) -> Self {
        Self {
            orders: deps.orders,
            carts: deps.carts,
            prices: deps.prices,
            customers: deps.customers,
            points: deps.points,
            locks: deps.locks,
            config,
        }
    }

    pub fn carts(&self) -> &CartService {
        &self.carts
    }

    /// Places a `Pending` order for everything in the customer's cart.
    ///
    /// Every line is re-priced from the store service; if any price cannot
    /// be fetched no order is created. Points are reserved before the order
    /// is stored and released again if storing fails. The cart is cleared
    /// once the order exists.
    #[tracing::instrument(skip(self, request), fields(store_id = %request.store_id))]
    pub async fn create_order_from_cart(
        &self,
        customer_id: CustomerId,
        request: CreateOrderRequest,
    ) -> Result<Order> {
        self.check_customer(customer_id).await?;

        let cart = self.carts.get_cart(customer_id).await?;
        if cart.is_empty() {
            return Err(OrderError::EmptyCart.into());
        }
        if let Some(cart_store) = cart.store_id()
            && cart_store != request.store_id
        {
            return Err(OrderServiceError::StoreMismatch {
                cart_store,
                requested: request.store_id,
            });
        }

        let lines = self.price_lines(&cart).await?;

        let now = Utc::now();
        let new_order = NewOrder {
            customer_id,
            store_id: request.store_id,
            fulfillment: request.fulfillment(),
            use_points: request.use_points.unwrap_or(false),
            points_to_use: Money::new(request.points_to_use.unwrap_or(0)),
        };
        let order = Order::create_pending(
            OrderId::new(),
            OrderNumber::generate(now.date_naive()),
            new_order,
            lines,
            now,
        )?;

        let mut saga = SagaTransaction::new();
        if order.points_to_use() > Money::zero() {
            self.points
                .reserve(customer_id, order.id(), order.points_to_use())
                .await
                .map_err(OrderServiceError::PointsReservation)?;

            let points = self.points.clone();
            let order_id = order.id();
            saga.add_compensation("release points", move || async move {
                points.release(customer_id, order_id).await
            })?;
        }

        let order = match self.insert_with_unique_number(order).await {
            Ok(order) => order,
            Err(e) => {
                let report = saga.compensate().await;
                if !report.is_clean() {
                    error!(
                        %customer_id,
                        failed_steps = report.failures.len(),
                        manual_intervention = true,
                        "Order creation rolled back with failed compensations"
                    );
                }
                return Err(e);
            }
        };
        saga.complete();

        self.carts.clear_cart(customer_id).await;

        metrics::counter!("orders_created_total").increment(1);
        info!(
            order_id = %order.id(),
            order_number = %order.order_number(),
            total = %order.total_price(),
            final_amount = %order.final_payment_amount(),
            "Order created"
        );
        Ok(order)
    }

    /// Records a settled payment.
    ///
    /// Repeating it on a paid order succeeds without changing anything,
    /// including the original payment id.
    #[tracing::instrument(skip(self))]
    pub async fn complete_payment(
        &self,
        order_id: OrderId,
        payment_id: PaymentId,
    ) -> Result<PaymentOutcome> {
        let (order, outcome) = self
            .transition(order_id, "complete payment", |order, now| {
                let outcome = order.complete_payment(payment_id, now)?;
                Ok((outcome, outcome == PaymentOutcome::Settled))
            })
            .await
            .inspect_err(|e| warn!(%order_id, error = %e, "Payment completion rejected"))?;

        match outcome {
            PaymentOutcome::AlreadyPaid => {
                info!(%order_id, %payment_id, "Order already paid; ignoring duplicate completion");
            }
            PaymentOutcome::Settled => {
                metrics::counter!("order_payments_completed_total").increment(1);
                info!(%order_id, %payment_id, "Order paid");
                self.notify_cart_invalidation(order.customer_id()).await;
            }
        }
        Ok(outcome)
    }

    /// Records a failed payment. Only a `Pending` order moves; on any other
    /// status this is a logged no-op.
    #[tracing::instrument(skip(self))]
    pub async fn fail_payment(
        &self,
        order_id: OrderId,
        reason: Option<&str>,
    ) -> Result<Transition> {
        let (_, transition) = self
            .transition(order_id, "fail payment", |order, now| {
                let transition = order.fail_payment(now);
                Ok((transition, transition.is_applied()))
            })
            .await?;

        match transition {
            Transition::Applied => {
                metrics::counter!("order_payments_failed_total").increment(1);
                info!(%order_id, reason = reason.unwrap_or("unspecified"), "Order payment failed");
            }
            Transition::Rejected { from, .. } => {
                warn!(
                    %order_id,
                    current = %from,
                    "Payment failure ignored; order already resolved"
                );
            }
            Transition::Unchanged => {}
        }
        Ok(transition)
    }

    /// Cancels the order from any status. Refunds are settled elsewhere.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Transition> {
        let (_, transition) = self
            .transition(order_id, "cancel", |order, now| {
                let transition = order.cancel(now);
                Ok((transition, transition.is_applied()))
            })
            .await?;

        if transition.is_applied() {
            metrics::counter!("orders_cancelled_total").increment(1);
            info!(%order_id, "Order cancelled");
        }
        Ok(transition)
    }

    /// Moves an order to the status named by `code`, if the status machine
    /// allows it. Forbidden moves are logged no-ops.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, code: &str) -> Result<Transition> {
        let next = OrderStatus::parse(code)
            .ok_or_else(|| OrderError::UnknownStatus(code.to_string()))?;

        let (_, transition) = self
            .transition(order_id, "update status", |order, now| {
                let transition = order.apply_status(next, now);
                Ok((transition, transition.is_applied()))
            })
            .await?;

        if let Transition::Rejected { from, to } = transition {
            warn!(%order_id, %from, %to, "Status update not allowed; ignoring");
        }
        Ok(transition)
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.load(order_id).await
    }

    pub async fn get_order_by_number(&self, number: &str) -> Result<Order> {
        self.orders
            .find_by_number(&OrderNumber::new(number))
            .await?
            .filter(|o| !o.is_deleted())
            .ok_or_else(|| OrderServiceError::OrderNotFound(number.to_string()))
    }

    pub async fn orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        Ok(self.orders.find_by_customer(customer_id).await?)
    }

    pub async fn orders_for_store(&self, store_id: StoreId) -> Result<Vec<Order>> {
        Ok(self.orders.find_by_store(store_id).await?)
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .find_by_id(order_id)
            .await?
            .filter(|o| !o.is_deleted())
            .ok_or_else(|| OrderServiceError::OrderNotFound(order_id.to_string()))
    }

    async fn check_customer(&self, customer_id: CustomerId) -> Result<()> {
        match self.customers.customer_exists(customer_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(OrderServiceError::CustomerNotFound(customer_id)),
            Err(e) => match self.config.customer_check {
                CustomerCheckPolicy::AllowOnFailure => {
                    warn!(%customer_id, error = %e, "Customer check failed; allowing by policy");
                    Ok(())
                }
                CustomerCheckPolicy::DenyOnFailure => {
                    warn!(%customer_id, error = %e, "Customer check failed; denying by policy");
                    Err(OrderServiceError::CustomerCheckUnavailable(e))
                }
            },
        }
    }

    async fn price_lines(&self, cart: &Cart) -> Result<Vec<OrderLine>> {
        let lookups = cart.items().iter().map(|item| async move {
            let price = self
                .prices
                .menu_price(item.menu_id)
                .await
                .and_then(|price| {
                    if price.is_negative() {
                        Err(ExternalError::InvalidResponse(format!("negative price {price}")))
                    } else {
                        Ok(price)
                    }
                })
                .map_err(|source| {
                    error!(menu_id = %item.menu_id, error = %source, "Menu price lookup failed");
                    OrderServiceError::PricingUnavailable {
                        menu_id: item.menu_id,
                        source,
                    }
                })?;
            Ok::<_, OrderServiceError>(OrderLine::new(
                item.menu_id,
                item.menu_name.clone(),
                item.quantity,
                price,
            ))
        });
        try_join_all(lookups).await
    }

    async fn insert_with_unique_number(&self, mut order: Order) -> Result<Order> {
        for attempt in 1..=self.config.order_number_attempts {
            match self.orders.insert(&order).await {
                Ok(()) => return Ok(order),
                Err(StoreError::DuplicateOrderNumber(number)) => {
                    warn!(attempt, %number, "Order number collision; generating a new one");
                    let fresh = OrderNumber::generate(Utc::now().date_naive());
                    order = order.with_order_number(fresh);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(OrderServiceError::OrderNumberExhausted)
    }

    /// Loads the order, applies `apply` and writes the new status if it
    /// changed, all under the order's lock.
    ///
    /// `apply` returns its outcome and whether the order changed. If the
    /// stored status moved between read and write, the order is re-read and
    /// `apply` runs again.
    async fn transition<F, R>(
        &self,
        order_id: OrderId,
        action: &'static str,
        apply: F,
    ) -> Result<(Order, R)>
    where
        F: Fn(&mut Order, DateTime<Utc>) -> Result<(R, bool)>,
    {
        let key = format!("order:{order_id}");
        self.locks
            .with_lock(&key, self.config.lock_wait, self.config.lock_lease, || async {
                for _ in 0..CONDITIONAL_WRITE_ATTEMPTS {
                    let mut order = self.load(order_id).await?;
                    let expected = order.status();
                    let (outcome, changed) = apply(&mut order, Utc::now())?;
                    if !changed || self.orders.update_status(&order, expected).await? {
                        return Ok((order, outcome));
                    }
                    warn!(%order_id, action, "Order changed during update; re-reading");
                }
                Err(OrderServiceError::ConcurrentModification(order_id))
            })
            .await
    }

    async fn notify_cart_invalidation(&self, customer_id: CustomerId) {
        if let Err(e) = self.customers.invalidate_cart(customer_id).await {
            warn!(%customer_id, error = %e, "Cart invalidation failed");
        }
    }
}
