//! Durable per-customer cart storage.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::CustomerId;
use domain::CartItem;
use tokio::sync::RwLock;

use crate::{Result, StoreError};

/// Durable cart storage, one cart per customer.
///
/// `save` replaces the customer's whole cart. An empty cart is stored as
/// "no cart".
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn find(&self, customer_id: CustomerId) -> Result<Option<Vec<CartItem>>>;

    async fn save(&self, customer_id: CustomerId, items: &[CartItem]) -> Result<()>;

    async fn delete(&self, customer_id: CustomerId) -> Result<()>;
}

/// In-memory cart repository for tests.
#[derive(Clone)]
pub struct InMemoryCartRepository {
    carts: Arc<RwLock<HashMap<CustomerId, Vec<CartItem>>>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryCartRepository {
    fn default() -> Self {
        Self {
            carts: Arc::new(RwLock::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl InMemoryCartRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail, to exercise write-back error paths.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn cart_count(&self) -> usize {
        self.carts.read().await.len()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("cart repository".to_string()))
        }
    }
}

#[async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn find(&self, customer_id: CustomerId) -> Result<Option<Vec<CartItem>>> {
        self.ensure_available()?;
        Ok(self.carts.read().await.get(&customer_id).cloned())
    }

    async fn save(&self, customer_id: CustomerId, items: &[CartItem]) -> Result<()> {
        self.ensure_available()?;
        let mut carts = self.carts.write().await;
        if items.is_empty() {
            carts.remove(&customer_id);
        } else {
            carts.insert(customer_id, items.to_vec());
        }
        Ok(())
    }

    async fn delete(&self, customer_id: CustomerId) -> Result<()> {
        self.ensure_available()?;
        self.carts.write().await.remove(&customer_id);
        Ok(())
    }
}
