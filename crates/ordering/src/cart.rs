//! Cart store: cache first, durable storage behind it.
//!
//! Reads probe the cache, fall back to durable storage on a miss or outage
//! and repopulate the cache on the way out. Writes land in the cache and are
//! acknowledged immediately; a background writer copies them to durable
//! storage in the order they were made. When the cache is down, a write
//! waits for the durable copy instead.
//!
//! An emptied cart stays in the cache as an empty list until its TTL runs
//! out, so a read racing the pending durable delete cannot resurrect the
//! old lines.

use std::sync::Arc;
use std::time::Duration;

use common::{CustomerId, MenuId};
use domain::{AddCartItem, Cart, CartItem};
use store::{CacheStore, CacheStoreExt, CartRepository, StoreError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::CartServiceError;

type Result<T> = std::result::Result<T, CartServiceError>;

/// How long a cached cart lives without being touched.
pub const DEFAULT_CART_TTL: Duration = Duration::from_secs(24 * 60 * 60);

enum SyncOp {
    Save {
        customer_id: CustomerId,
        items: Vec<CartItem>,
        ack: Option<oneshot::Sender<std::result::Result<(), StoreError>>>,
    },
    Flush(oneshot::Sender<()>),
}

/// Per-customer cart store with write-back to durable storage.
#[derive(Clone)]
pub struct CartService {
    cache: Arc<dyn CacheStore>,
    repo: Arc<dyn CartRepository>,
    ttl: Duration,
    sync_tx: mpsc::UnboundedSender<SyncOp>,
}

impl CartService {
    /// Creates the service and starts its background writer.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(cache: Arc<dyn CacheStore>, repo: Arc<dyn CartRepository>) -> Self {
        Self::with_ttl(cache, repo, DEFAULT_CART_TTL)
    }

    pub fn with_ttl(
        cache: Arc<dyn CacheStore>,
        repo: Arc<dyn CartRepository>,
        ttl: Duration,
    ) -> Self {
        let (sync_tx, sync_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(repo.clone(), sync_rx));
        Self {
            cache,
            repo,
            ttl,
            sync_tx,
        }
    }

    fn cache_key(customer_id: CustomerId) -> String {
        format!("cart:{customer_id}")
    }

    /// Returns the customer's cart, empty if there is none.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, customer_id: CustomerId) -> Result<Cart> {
        let key = Self::cache_key(customer_id);
        let cache_alive = self.cache.ping().await;

        if cache_alive {
            match self.cache.get_json::<Vec<CartItem>>(&key).await {
                Ok(Some(items)) => {
                    metrics::counter!("cart_cache_hits_total").increment(1);
                    debug!(%customer_id, lines = items.len(), "Cart served from cache");
                    return Ok(Cart::from_items(customer_id, items));
                }
                Ok(None) => {
                    metrics::counter!("cart_cache_misses_total").increment(1);
                }
                Err(e) => {
                    metrics::counter!("cart_cache_fallbacks_total").increment(1);
                    warn!(%customer_id, error = %e, "Cart cache read failed, using durable store");
                }
            }
        } else {
            metrics::counter!("cart_cache_fallbacks_total").increment(1);
            debug!(%customer_id, "Cart cache unavailable, using durable store");
        }

        let items = self.repo.find(customer_id).await?.unwrap_or_default();
        if cache_alive {
            self.write_cache(customer_id, &items).await;
        }
        Ok(Cart::from_items(customer_id, items))
    }

    /// Adds an item, or increases the quantity of an existing line.
    #[tracing::instrument(skip(self, request), fields(menu_id = %request.menu_id))]
    pub async fn add_item(&self, customer_id: CustomerId, request: AddCartItem) -> Result<Cart> {
        let mut cart = self.get_cart(customer_id).await?;
        cart.add_item(request)?;
        self.put(&cart).await?;
        info!(%customer_id, lines = cart.items().len(), "Item added to cart");
        Ok(cart)
    }

    /// Replaces a line's quantity. Zero removes the line.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        customer_id: CustomerId,
        menu_id: MenuId,
        quantity: i64,
    ) -> Result<Cart> {
        let mut cart = self.get_cart(customer_id).await?;
        cart.update_quantity(menu_id, quantity)?;
        self.put(&cart).await?;
        Ok(cart)
    }

    /// Removes a line. A missing line is an error.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, customer_id: CustomerId, menu_id: MenuId) -> Result<Cart> {
        let mut cart = self.get_cart(customer_id).await?;
        cart.remove_item(menu_id)?;
        self.put(&cart).await?;
        Ok(cart)
    }

    /// Empties the cart in both tiers. Clearing an empty cart is fine, and
    /// storage failures are only logged.
    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, customer_id: CustomerId) {
        match self.store(customer_id, Vec::new()).await {
            Ok(()) => info!(%customer_id, "Cart cleared"),
            Err(e) => warn!(%customer_id, error = %e, "Failed to clear durable cart"),
        }
    }

    /// Drops the cached copy so the next read comes from durable storage.
    pub async fn invalidate(&self, customer_id: CustomerId) {
        if !self.cache.ping().await {
            return;
        }
        if let Err(e) = self.cache.delete(&Self::cache_key(customer_id)).await {
            warn!(%customer_id, error = %e, "Failed to drop cached cart");
        }
    }

    /// Waits until every write accepted so far has reached durable storage
    /// (or failed and been logged).
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sync_tx.send(SyncOp::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Stores the cart: cache plus background durable write, or a direct
    /// durable write while the cache is down.
    async fn put(&self, cart: &Cart) -> Result<()> {
        self.store(cart.customer_id(), cart.items().to_vec()).await
    }

    async fn store(&self, customer_id: CustomerId, items: Vec<CartItem>) -> Result<()> {
        if self.cache.ping().await && self.write_cache(customer_id, &items).await {
            self.enqueue(customer_id, items, None);
            return Ok(());
        }

        let (tx, rx) = oneshot::channel();
        self.enqueue(customer_id, items, Some(tx));
        match rx.await {
            Ok(result) => Ok(result?),
            // The writer only stops when the service is gone
            Err(_) => Err(StoreError::Unavailable("cart writer stopped".to_string()).into()),
        }
    }

    async fn write_cache(&self, customer_id: CustomerId, items: &[CartItem]) -> bool {
        let key = Self::cache_key(customer_id);
        match self.cache.set_json(&key, &items, self.ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%customer_id, error = %e, "Failed to write cart cache");
                false
            }
        }
    }

    fn enqueue(
        &self,
        customer_id: CustomerId,
        items: Vec<CartItem>,
        ack: Option<oneshot::Sender<std::result::Result<(), StoreError>>>,
    ) {
        let op = SyncOp::Save {
            customer_id,
            items,
            ack,
        };
        if self.sync_tx.send(op).is_err() {
            error!(%customer_id, "Cart writer stopped; durable copy not updated");
        }
    }

    /// The durable repository, for callers that need to inspect it.
    pub fn repository(&self) -> &Arc<dyn CartRepository> {
        &self.repo
    }
}

async fn run_writer(repo: Arc<dyn CartRepository>, mut rx: mpsc::UnboundedReceiver<SyncOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            SyncOp::Save {
                customer_id,
                items,
                ack,
            } => {
                let result = repo.save(customer_id, &items).await;
                if let Err(e) = &result {
                    metrics::counter!("cart_sync_failures_total").increment(1);
                    error!(%customer_id, error = %e, "Failed to sync cart to durable store");
                } else {
                    debug!(%customer_id, lines = items.len(), "Cart synced to durable store");
                }
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
            }
            SyncOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
