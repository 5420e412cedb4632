//! Peer services consulted by the order engine.
//!
//! Prices come from the store service, customer existence and point
//! reservations from the customer service. Every call is bounded by the
//! client's connect and read timeouts.

mod http;
mod memory;

pub use http::{ExternalConfig, HttpCustomerClient, HttpMenuPriceClient};
pub use memory::{InMemoryCustomerDirectory, InMemoryMenuCatalog, InMemoryPointsLedger};

use async_trait::async_trait;
use common::{CustomerId, MenuId, Money, OrderId};
use thiserror::Error;

/// Errors from peer service calls.
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The peer refused the request, e.g. not enough points.
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ExternalError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExternalError::Http(e) if e.is_timeout())
    }
}

/// Authoritative menu prices.
#[async_trait]
pub trait MenuPriceLookup: Send + Sync {
    async fn menu_price(&self, menu_id: MenuId) -> Result<Money, ExternalError>;
}

/// Customer registry.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn customer_exists(&self, customer_id: CustomerId) -> Result<bool, ExternalError>;

    /// Tells the customer service to drop its cached cart. Fire-and-forget:
    /// callers log failures and carry on.
    async fn invalidate_cart(&self, customer_id: CustomerId) -> Result<(), ExternalError>;
}

/// Loyalty point reservations, keyed by order.
#[async_trait]
pub trait PointsLedger: Send + Sync {
    /// Holds `points` of the customer's balance for `order_id`.
    async fn reserve(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
        points: Money,
    ) -> Result<(), ExternalError>;

    /// Returns a reservation to the balance. Releasing an unknown
    /// reservation is not an error.
    async fn release(&self, customer_id: CustomerId, order_id: OrderId)
    -> Result<(), ExternalError>;
}
