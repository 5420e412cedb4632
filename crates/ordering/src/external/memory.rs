use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{CustomerId, MenuId, Money, OrderId};
use tokio::sync::RwLock;

use super::{CustomerDirectory, ExternalError, MenuPriceLookup, PointsLedger};

/// In-memory menu catalog for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryMenuCatalog {
    prices: Arc<RwLock<HashMap<MenuId, Money>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryMenuCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_price(&self, menu_id: MenuId, price: Money) {
        self.prices.write().await.insert(menu_id, price);
    }

    /// Makes every lookup fail as if the store service were down.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }
}

#[async_trait]
impl MenuPriceLookup for InMemoryMenuCatalog {
    async fn menu_price(&self, menu_id: MenuId) -> Result<Money, ExternalError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ExternalError::Unavailable("store service".to_string()));
        }
        self.prices
            .read()
            .await
            .get(&menu_id)
            .copied()
            .ok_or_else(|| ExternalError::NotFound(format!("menu {menu_id}")))
    }
}

/// In-memory customer registry for tests and local runs.
///
/// With `accept_all`, every customer exists.
#[derive(Clone, Default)]
pub struct InMemoryCustomerDirectory {
    customers: Arc<RwLock<HashSet<CustomerId>>>,
    accept_all: bool,
    unavailable: Arc<AtomicBool>,
    invalidations: Arc<AtomicUsize>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory in which every customer exists.
    pub fn accepting_all() -> Self {
        Self {
            accept_all: true,
            ..Self::default()
        }
    }

    pub async fn register(&self, customer_id: CustomerId) {
        self.customers.write().await.insert(customer_id);
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of cart invalidations received.
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), ExternalError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(ExternalError::Unavailable("customer service".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn customer_exists(&self, customer_id: CustomerId) -> Result<bool, ExternalError> {
        self.ensure_available()?;
        Ok(self.accept_all || self.customers.read().await.contains(&customer_id))
    }

    async fn invalidate_cart(&self, _customer_id: CustomerId) -> Result<(), ExternalError> {
        self.ensure_available()?;
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory points ledger for tests and local runs.
///
/// Customers without a recorded balance have unlimited points.
#[derive(Clone, Default)]
pub struct InMemoryPointsLedger {
    balances: Arc<RwLock<HashMap<CustomerId, Money>>>,
    reservations: Arc<RwLock<HashMap<OrderId, (CustomerId, Money)>>>,
    fail_releases: Arc<AtomicBool>,
}

impl InMemoryPointsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_balance(&self, customer_id: CustomerId, balance: Money) {
        self.balances.write().await.insert(customer_id, balance);
    }

    pub async fn balance(&self, customer_id: CustomerId) -> Option<Money> {
        self.balances.read().await.get(&customer_id).copied()
    }

    pub async fn reservation(&self, order_id: OrderId) -> Option<Money> {
        self.reservations
            .read()
            .await
            .get(&order_id)
            .map(|(_, points)| *points)
    }

    pub async fn reservation_count(&self) -> usize {
        self.reservations.read().await.len()
    }

    /// Makes releases fail, to exercise compensation failure reporting.
    pub fn set_fail_releases(&self, fail: bool) {
        self.fail_releases.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PointsLedger for InMemoryPointsLedger {
    async fn reserve(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
        points: Money,
    ) -> Result<(), ExternalError> {
        let mut reservations = self.reservations.write().await;
        if reservations.contains_key(&order_id) {
            return Err(ExternalError::Rejected(format!(
                "points already reserved for order {order_id}"
            )));
        }

        let mut balances = self.balances.write().await;
        if let Some(balance) = balances.get_mut(&customer_id) {
            if *balance < points {
                return Err(ExternalError::Rejected(format!(
                    "insufficient points: {balance} available, {points} requested"
                )));
            }
            *balance = *balance - points;
        }
        reservations.insert(order_id, (customer_id, points));
        Ok(())
    }

    async fn release(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<(), ExternalError> {
        if self.fail_releases.load(Ordering::SeqCst) {
            return Err(ExternalError::Unavailable("customer service".to_string()));
        }

        let mut reservations = self.reservations.write().await;
        if let Some((holder, points)) = reservations.remove(&order_id)
            && holder == customer_id
            && let Some(balance) = self.balances.write().await.get_mut(&customer_id)
        {
            *balance = *balance + points;
        }
        Ok(())
    }
}
