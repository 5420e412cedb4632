//! Durable order storage.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, OrderId, StoreId};
use domain::{Order, OrderNumber, OrderStatus};
use tokio::sync::RwLock;

use crate::{Result, SoftDelete, StoreError};

/// Durable order storage.
///
/// Order numbers are unique across all orders, deleted ones included.
/// Listing queries skip soft-deleted orders and return newest first.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts a new order.
    ///
    /// Fails with [`StoreError::DuplicateOrderNumber`] when the order number
    /// is taken, so the caller can retry with a fresh one.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Loads an order by id, including soft-deleted ones.
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>>;

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>>;

    async fn find_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>>;

    async fn find_by_store(&self, store_id: StoreId) -> Result<Vec<Order>>;

    /// Persists the status, payment id and update time of `order`, but only
    /// if the stored status still equals `expected`.
    ///
    /// Returns `false` when another writer changed the status first.
    async fn update_status(&self, order: &Order, expected: OrderStatus) -> Result<bool>;
}

/// In-memory order repository for tests.
#[derive(Clone)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self {
            orders: Arc::new(RwLock::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail, to exercise compensation paths.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("order repository".to_string()))
        }
    }

    async fn list_where(&self, predicate: impl Fn(&Order) -> bool) -> Result<Vec<Order>> {
        self.ensure_available()?;
        let orders = self.orders.read().await;
        let mut matching: Vec<Order> = orders
            .values()
            .filter(|o| !o.is_deleted() && predicate(o))
            .cloned()
            .collect();
        matching.sort_by_key(|o| std::cmp::Reverse(o.created_at()));
        Ok(matching)
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<()> {
        self.ensure_available()?;
        let mut orders = self.orders.write().await;

        if orders.contains_key(&order.id()) {
            return Err(StoreError::DuplicateOrderId(order.id()));
        }
        // Unique index simulation
        if orders
            .values()
            .any(|o| o.order_number() == order.order_number())
        {
            return Err(StoreError::DuplicateOrderNumber(
                order.order_number().to_string(),
            ));
        }

        orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        self.ensure_available()?;
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        self.ensure_available()?;
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.order_number() == number)
            .cloned())
    }

    async fn find_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        self.list_where(|o| o.customer_id() == customer_id).await
    }

    async fn find_by_store(&self, store_id: StoreId) -> Result<Vec<Order>> {
        self.list_where(|o| o.store_id() == store_id).await
    }

    async fn update_status(&self, order: &Order, expected: OrderStatus) -> Result<bool> {
        self.ensure_available()?;
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.id())
            .ok_or(StoreError::OrderNotFound(order.id()))?;

        if stored.status() != expected {
            return Ok(false);
        }

        let mut record = stored.to_record();
        record.status = order.status();
        record.payment_id = order.payment_id();
        record.updated_at = order.updated_at();
        *stored = Order::from_record(record);
        Ok(true)
    }
}

#[async_trait]
impl SoftDelete for InMemoryOrderRepository {
    type Id = OrderId;
    type Entity = Order;

    async fn find_active(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.find_by_id(id).await?.filter(|o| !o.is_deleted()))
    }

    async fn soft_delete(&self, id: OrderId) -> Result<bool> {
        self.ensure_available()?;
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id) {
            Some(order) => {
                order.mark_deleted(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn restore(&self, id: OrderId) -> Result<bool> {
        self.ensure_available()?;
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id) {
            Some(order) => {
                order.restore(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{MenuId, Money, PaymentId};
    use domain::{Fulfillment, NewOrder, OrderLine};

    fn order_for(customer_id: CustomerId, store_id: StoreId, number: &str) -> Order {
        let request = NewOrder {
            customer_id,
            store_id,
            fulfillment: Fulfillment::Pickup { requests: None },
            use_points: false,
            points_to_use: Money::zero(),
        };
        let lines = vec![OrderLine::new(MenuId::new(), "Dumplings", 1, Money::new(6))];
        Order::create_pending(
            OrderId::new(),
            OrderNumber::new(number),
            request,
            lines,
            Utc::now(),
        )
        .unwrap()
    }

    fn order(number: &str) -> Order {
        order_for(CustomerId::new(), StoreId::new(), number)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = InMemoryOrderRepository::new();
        let order = order("ORD-20241215-AAAAA");
        repo.insert(&order).await.unwrap();

        assert_eq!(repo.find_by_id(order.id()).await.unwrap(), Some(order.clone()));
        assert_eq!(
            repo.find_by_number(order.order_number()).await.unwrap(),
            Some(order)
        );
    }

    #[tokio::test]
    async fn test_duplicate_order_number_rejected() {
        let repo = InMemoryOrderRepository::new();
        repo.insert(&order("ORD-20241215-AAAAA")).await.unwrap();

        let result = repo.insert(&order("ORD-20241215-AAAAA")).await;
        assert!(matches!(result, Err(StoreError::DuplicateOrderNumber(n)) if n == "ORD-20241215-AAAAA"));
        assert_eq!(repo.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_status_is_conditional() {
        let repo = InMemoryOrderRepository::new();
        let mut order = order("ORD-20241215-AAAAA");
        repo.insert(&order).await.unwrap();

        order.complete_payment(PaymentId::new(), Utc::now()).unwrap();
        assert!(repo.update_status(&order, OrderStatus::Pending).await.unwrap());
        // The stored status is now Paid, so a second writer expecting Pending loses
        assert!(!repo.update_status(&order, OrderStatus::Pending).await.unwrap());

        let stored = repo.find_by_id(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Paid);
        assert_eq!(stored.payment_id(), order.payment_id());
    }

    #[tokio::test]
    async fn test_update_missing_order_errors() {
        let repo = InMemoryOrderRepository::new();
        let order = order("ORD-20241215-AAAAA");
        assert!(matches!(
            repo.update_status(&order, OrderStatus::Pending).await,
            Err(StoreError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_listing_skips_deleted_and_sorts_newest_first() {
        let repo = InMemoryOrderRepository::new();
        let customer = CustomerId::new();
        let store = StoreId::new();

        let older = order_for(customer, store, "ORD-20241215-AAAAA");
        let mut newer_record = order_for(customer, store, "ORD-20241215-BBBBB").to_record();
        newer_record.created_at = older.created_at() + Duration::seconds(5);
        let newer = Order::from_record(newer_record);
        let deleted = order_for(customer, store, "ORD-20241215-CCCCC");

        for o in [&older, &newer, &deleted] {
            repo.insert(o).await.unwrap();
        }
        assert!(repo.soft_delete(deleted.id()).await.unwrap());

        let by_customer = repo.find_by_customer(customer).await.unwrap();
        let ids: Vec<_> = by_customer.iter().map(Order::id).collect();
        assert_eq!(ids, vec![newer.id(), older.id()]);

        assert_eq!(repo.find_by_store(store).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let repo = InMemoryOrderRepository::new();
        let order = order("ORD-20241215-AAAAA");
        repo.insert(&order).await.unwrap();

        assert!(repo.soft_delete(order.id()).await.unwrap());
        assert_eq!(repo.find_active(order.id()).await.unwrap(), None);
        assert!(repo.find_by_id(order.id()).await.unwrap().is_some());

        assert!(repo.restore(order.id()).await.unwrap());
        assert!(repo.find_active(order.id()).await.unwrap().is_some());

        assert!(!repo.soft_delete(OrderId::new()).await.unwrap());
    }
}
