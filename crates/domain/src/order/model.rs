//! The order entity.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, PaymentId, StoreId};
use serde::{Deserialize, Serialize};

use super::{Fulfillment, OrderError, OrderLine, OrderNumber, OrderStatus, OrderType, Transition};

/// Customer-supplied parameters for a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub store_id: StoreId,
    pub fulfillment: Fulfillment,
    pub use_points: bool,
    pub points_to_use: Money,
}

/// Outcome of a successful payment completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The order moved from `Pending` to `Paid`.
    Settled,
    /// The order was already paid; nothing changed.
    AlreadyPaid,
}

/// Flat view of an order as it is persisted.
///
/// Repositories read and write this shape; [`Order::from_record`] trusts it,
/// so it must only be built from previously stored orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: CustomerId,
    pub store_id: StoreId,
    pub status: OrderStatus,
    pub fulfillment: Fulfillment,
    pub lines: Vec<OrderLine>,
    pub total_price: Money,
    pub use_points: bool,
    pub points_to_use: Money,
    pub final_payment_amount: Money,
    pub payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A placed order.
///
/// Lines and amounts are fixed at creation. Afterwards only the status, the
/// payment id and the bookkeeping timestamps change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_number: OrderNumber,
    customer_id: CustomerId,
    store_id: StoreId,
    status: OrderStatus,
    fulfillment: Fulfillment,
    lines: Vec<OrderLine>,
    total_price: Money,
    use_points: bool,
    points_to_use: Money,
    final_payment_amount: Money,
    payment_id: Option<PaymentId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Creates a `Pending` order from priced lines.
    ///
    /// `total_price` is the sum of line totals and the amount to pay is
    /// `max(total_price - points_to_use, 0)`.
    pub fn create_pending(
        id: OrderId,
        order_number: OrderNumber,
        request: NewOrder,
        lines: Vec<OrderLine>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        if request.points_to_use.is_negative() {
            return Err(OrderError::InvalidPoints {
                points: request.points_to_use.amount(),
            });
        }
        if let Fulfillment::Delivery { address, .. } = &request.fulfillment
            && address.trim().is_empty()
        {
            return Err(OrderError::MissingDeliveryAddress);
        }

        let total_price: Money = lines.iter().map(OrderLine::line_total).sum();
        let final_payment_amount = total_price.saturating_sub_to_zero(request.points_to_use);

        Ok(Self {
            id,
            order_number,
            customer_id: request.customer_id,
            store_id: request.store_id,
            status: OrderStatus::Pending,
            fulfillment: request.fulfillment,
            lines,
            total_price,
            use_points: request.use_points,
            points_to_use: request.points_to_use,
            final_payment_amount,
            payment_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Replaces the order number, used when the first one collided.
    pub fn with_order_number(mut self, order_number: OrderNumber) -> Self {
        self.order_number = order_number;
        self
    }

    /// Records a settled payment.
    ///
    /// Already-paid orders succeed without change and keep their original
    /// payment id. Any status other than `Pending` or `Paid` is an error.
    pub fn complete_payment(
        &mut self,
        payment_id: PaymentId,
        now: DateTime<Utc>,
    ) -> Result<PaymentOutcome, OrderError> {
        match self.status.transition_to(OrderStatus::Paid) {
            Transition::Unchanged => Ok(PaymentOutcome::AlreadyPaid),
            Transition::Applied => {
                self.payment_id = Some(payment_id);
                self.status = OrderStatus::Paid;
                self.updated_at = now;
                Ok(PaymentOutcome::Settled)
            }
            Transition::Rejected { from, .. } => Err(OrderError::InvalidStateTransition {
                current_state: from,
                action: "complete payment",
            }),
        }
    }

    /// Records a failed payment. Only a `Pending` order moves.
    pub fn fail_payment(&mut self, now: DateTime<Utc>) -> Transition {
        if self.status != OrderStatus::Pending {
            return Transition::Rejected {
                from: self.status,
                to: OrderStatus::PaymentFailed,
            };
        }
        self.status = OrderStatus::PaymentFailed;
        self.updated_at = now;
        Transition::Applied
    }

    /// Cancels the order from any status. Repeating it changes nothing.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Transition {
        if self.status == OrderStatus::Cancelled {
            return Transition::Unchanged;
        }
        self.status = OrderStatus::Cancelled;
        self.updated_at = now;
        Transition::Applied
    }

    /// Moves to `next` if the status machine allows it.
    pub fn apply_status(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Transition {
        let transition = self.status.transition_to(next);
        if transition.is_applied() {
            self.status = next;
            self.updated_at = now;
        }
        transition
    }

    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    pub fn restore(&mut self, now: DateTime<Utc>) {
        self.deleted_at = None;
        self.updated_at = now;
    }
}

impl Order {
    /// Rebuilds an order from storage.
    pub fn from_record(record: OrderRecord) -> Self {
        Self {
            id: record.id,
            order_number: record.order_number,
            customer_id: record.customer_id,
            store_id: record.store_id,
            status: record.status,
            fulfillment: record.fulfillment,
            lines: record.lines,
            total_price: record.total_price,
            use_points: record.use_points,
            points_to_use: record.points_to_use,
            final_payment_amount: record.final_payment_amount,
            payment_id: record.payment_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
        }
    }

    pub fn to_record(&self) -> OrderRecord {
        OrderRecord {
            id: self.id,
            order_number: self.order_number.clone(),
            customer_id: self.customer_id,
            store_id: self.store_id,
            status: self.status,
            fulfillment: self.fulfillment.clone(),
            lines: self.lines.clone(),
            total_price: self.total_price,
            use_points: self.use_points,
            points_to_use: self.points_to_use,
            final_payment_amount: self.final_payment_amount,
            payment_id: self.payment_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn order_type(&self) -> OrderType {
        self.fulfillment.order_type()
    }

    pub fn fulfillment(&self) -> &Fulfillment {
        &self.fulfillment
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn use_points(&self) -> bool {
        self.use_points
    }

    pub fn points_to_use(&self) -> Money {
        self.points_to_use
    }

    pub fn final_payment_amount(&self) -> Money {
        self.final_payment_amount
    }

    pub fn payment_id(&self) -> Option<PaymentId> {
        self.payment_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use common::MenuId;

    fn new_order(points: i64) -> NewOrder {
        NewOrder {
            customer_id: CustomerId::new(),
            store_id: StoreId::new(),
            fulfillment: Fulfillment::Delivery {
                address: "12 Harbor Rd".to_string(),
                requests: Some("Ring twice".to_string()),
            },
            use_points: points > 0,
            points_to_use: Money::new(points),
        }
    }

    fn lines() -> Vec<OrderLine> {
        vec![
            OrderLine::new(MenuId::new(), "Menu A", 2, Money::new(8)),
            OrderLine::new(MenuId::new(), "Menu B", 1, Money::new(7)),
        ]
    }

    fn number() -> OrderNumber {
        OrderNumber::generate(NaiveDate::from_ymd_opt(2024, 12, 15).unwrap())
    }

    fn pending(points: i64) -> Order {
        Order::create_pending(OrderId::new(), number(), new_order(points), lines(), Utc::now())
            .unwrap()
    }

    #[test]
    fn test_pricing() {
        let order = pending(5);
        assert_eq!(order.total_price(), Money::new(23));
        assert_eq!(order.final_payment_amount(), Money::new(18));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_id(), None);
    }

    #[test]
    fn test_final_amount_floors_at_zero() {
        let order = pending(500);
        assert_eq!(order.final_payment_amount(), Money::zero());
    }

    #[test]
    fn test_empty_lines_rejected() {
        let result = Order::create_pending(
            OrderId::new(),
            number(),
            new_order(0),
            Vec::new(),
            Utc::now(),
        );
        assert!(matches!(result, Err(OrderError::EmptyCart)));
    }

    #[test]
    fn test_negative_points_rejected() {
        let result =
            Order::create_pending(OrderId::new(), number(), new_order(-1), lines(), Utc::now());
        assert!(matches!(result, Err(OrderError::InvalidPoints { points: -1 })));
    }

    #[test]
    fn test_blank_delivery_address_rejected() {
        let mut request = new_order(0);
        request.fulfillment = Fulfillment::Delivery {
            address: " ".to_string(),
            requests: None,
        };
        let result = Order::create_pending(OrderId::new(), number(), request, lines(), Utc::now());
        assert!(matches!(result, Err(OrderError::MissingDeliveryAddress)));
    }

    #[test]
    fn test_complete_payment_is_idempotent() {
        let mut order = pending(0);
        let first = PaymentId::new();
        let second = PaymentId::new();

        assert_eq!(
            order.complete_payment(first, Utc::now()).unwrap(),
            PaymentOutcome::Settled
        );
        assert_eq!(
            order.complete_payment(second, Utc::now()).unwrap(),
            PaymentOutcome::AlreadyPaid
        );
        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(order.payment_id(), Some(first));
    }

    #[test]
    fn test_complete_after_failure_is_rejected() {
        let mut order = pending(0);
        assert!(order.fail_payment(Utc::now()).is_applied());

        let err = order.complete_payment(PaymentId::new(), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidStateTransition {
                current_state: OrderStatus::PaymentFailed,
                ..
            }
        ));
        assert_eq!(order.payment_id(), None);
    }

    #[test]
    fn test_fail_after_paid_is_noop() {
        let mut order = pending(0);
        order.complete_payment(PaymentId::new(), Utc::now()).unwrap();

        let transition = order.fail_payment(Utc::now());
        assert!(matches!(transition, Transition::Rejected { .. }));
        assert_eq!(order.status(), OrderStatus::Paid);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut order = pending(0);
        order.complete_payment(PaymentId::new(), Utc::now()).unwrap();

        assert_eq!(order.cancel(Utc::now()), Transition::Applied);
        assert_eq!(order.cancel(Utc::now()), Transition::Unchanged);
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_apply_status_follows_machine() {
        let mut order = pending(0);
        assert!(order.apply_status(OrderStatus::Cancelled, Utc::now()).is_applied());
        assert!(matches!(
            order.apply_status(OrderStatus::Pending, Utc::now()),
            Transition::Rejected { .. }
        ));
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_record_rebuilds_same_order() {
        let mut order = pending(5);
        order.complete_payment(PaymentId::new(), Utc::now()).unwrap();
        assert_eq!(Order::from_record(order.to_record()), order);
    }

    #[test]
    fn test_soft_delete_and_restore() {
        let mut order = pending(0);
        order.mark_deleted(Utc::now());
        assert!(order.is_deleted());
        order.restore(Utc::now());
        assert!(!order.is_deleted());
    }
}
